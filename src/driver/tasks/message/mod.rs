mod core;
mod pacer;
mod udp_tx;
mod ws;

pub(crate) use self::core::*;
pub(crate) use self::pacer::*;
pub(crate) use self::udp_tx::*;
pub(crate) use self::ws::*;

use flume::Sender;

#[derive(Clone, Debug)]
pub(crate) struct Interconnect {
    pub core: Sender<CoreMessage>,
    pub pacer: Sender<PacerMessage>,
}

impl Interconnect {
    pub fn poison_all(&self) {
        drop(self.core.send(CoreMessage::Poison));
        drop(self.pacer.send(PacerMessage::Poison));
    }
}
