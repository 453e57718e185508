// Domain layer modules.
//
// Non-UI logic the engine consumes as data. Nothing in here touches the
// terminal or the network.
//
// - template: placeholder documents for a compiled schema
// - codec: JSON <-> Avro datum, wire envelope
// - subject: subject/topic naming, list filtering
// - drafts: saved drafts on disk
// - editor: external editor hand-off

pub mod codec;
pub mod drafts;
pub mod editor;
pub mod subject;
pub mod template;
