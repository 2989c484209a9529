#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum WsMessage {
    Speaking(bool),
    Poison,
}
