/*!
Event loop.

Owns the terminal and drives the reducer:

1. Wait for the next terminal event or internal event (`tokio::select!`).
2. Translate terminal input into an [`Intent`], hand it or the internal event
   to the reducer.
3. Interpret the returned effects: background tasks go to the executor,
   local I/O is performed inline and its outcome is reduced right away,
   consumer handles are closed on a detached task.
4. Redraw on render ticks and resizes.

Exactly one event is reduced at a time; the reducer never runs concurrently
with itself.
*/

use std::collections::VecDeque;

use color_eyre::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::effects::{Effect, InternalEvent};
use crate::core::executor::{Gateways, TaskExecutor};
use crate::core::intent::Intent;
use crate::core::io::LocalIo;
use crate::core::reducer;
use crate::core::state::RootState;
use crate::tui::{Event, Tui};
use crate::ui::render;
use crate::ui::theme::Theme;

enum Next {
    Terminal(Event),
    Internal(InternalEvent),
    Closed,
}

pub struct AppLoop {
    state: RootState,
    tui: Tui,
    theme: Theme,
    local: LocalIo,
    executor: TaskExecutor,
    internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
}

impl AppLoop {
    /// Must be called inside the Tokio runtime (spawns the executor worker).
    pub fn new(state: RootState, tui: Tui, theme: Theme, local: LocalIo, gateways: Gateways) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let executor = TaskExecutor::new(gateways, internal_tx);
        Self {
            state,
            tui,
            theme,
            local,
            executor,
            internal_rx,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        info!(profile = %self.state.profile, "session started");
        let effects = reducer::initial_effects(&mut self.state);
        self.apply(effects)?;
        self.render()?;

        while !self.state.should_quit {
            let next = tokio::select! {
                ev = self.tui.next() => ev.map_or(Next::Closed, Next::Terminal),
                ev = self.internal_rx.recv() => ev.map_or(Next::Closed, Next::Internal),
            };
            match next {
                Next::Terminal(event) => self.on_terminal(event)?,
                Next::Internal(event) => {
                    let effects = reducer::reduce_internal(&mut self.state, event);
                    self.apply(effects)?;
                }
                Next::Closed => break,
            }
        }

        if let crate::core::state::Mode::Consuming(consume) = self.state.take_mode() {
            if let Some(consumer) = consume.consumer {
                consumer.close().await;
            }
        }
        self.tui.exit()?;
        info!("session ended");
        Ok(())
    }

    fn on_terminal(&mut self, event: Event) -> Result<()> {
        let intent = match event {
            Event::Key(key) => Intent::Key(key),
            Event::Paste(text) => Intent::Paste(text),
            Event::Render => return self.render(),
            Event::Resize(w, h) => {
                self.tui.resize(ratatui::layout::Rect::new(0, 0, w, h))?;
                return self.render();
            }
            Event::Init | Event::Tick | Event::FocusGained | Event::FocusLost | Event::Error => {
                return Ok(());
            }
        };
        let effects = reducer::reduce_intent(&mut self.state, intent);
        self.apply(effects)
    }

    /// Interpret effects in order. Local I/O outcomes are reduced immediately
    /// and their follow-up effects join the queue.
    fn apply(&mut self, effects: Vec<Effect>) -> Result<()> {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Async(kind) => {
                    let id = self.executor.spawn(kind);
                    debug!("[task:{id}] scheduled");
                }
                Effect::Io(request) => {
                    let event = if request.needs_terminal() {
                        let local = &self.local;
                        self.tui
                            .suspended(|| tokio::task::block_in_place(|| local.perform(request)))?
                    } else {
                        self.local.perform(request)
                    };
                    queue.extend(reducer::reduce_internal(&mut self.state, event));
                }
                Effect::CloseConsumer(consumer) => {
                    tokio::spawn(consumer.close());
                }
            }
        }
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let state = &self.state;
        let theme = &self.theme;
        self.tui.draw(|f| render::draw(f, state, theme))?;
        Ok(())
    }
}
