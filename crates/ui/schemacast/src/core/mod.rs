//! Core of the session: state, the workflow engine and the machinery that
//! runs its effects.
//!
//!   - `state`    : `RootState` and the mode enum
//!   - `intent`   : user input handed to the reducer
//!   - `effects`  : declarative effect / task / event model
//!   - `reducer`  : the state machine (pure)
//!   - `executor` : background task scheduler (network work)
//!   - `io`       : inline local work (drafts, clipboard, editor)
//!   - `loop`     : `AppLoop`, terminal + internal event dispatch
pub mod effects;
pub mod executor;
pub mod intent;
pub mod io;
pub mod r#loop;
pub mod reducer;
pub mod state;
