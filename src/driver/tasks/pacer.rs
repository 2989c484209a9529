use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use flume::{Receiver, TryRecvError};
use spin_sleep::SpinSleeper;
use tracing::{debug, error, info, trace, warn};

use super::message::*;
use crate::constants::*;
use crate::driver::schedule::Schedule;
use crate::driver::sink::SinkError;
use crate::driver::{Config, FinishBehaviour};
use crate::input::AudioSource;

/// What the active source yielded on one tick.
#[derive(Debug, Eq, PartialEq)]
enum Polled {
    Audio(Vec<u8>),
    /// A frame from a muted source, sent as the silence sentinel.
    Silence,
    Nothing,
}

/// The frame pacer: pulls one frame per 20ms tick from the active source and sends it.
pub(crate) struct Pacer {
    config: Config,
    conn_active: Option<PacerConnection>,
    filler: Option<Box<dyn AudioSource>>,
    halt: Arc<AtomicBool>,
    muted: bool,
    pacer_rx: Receiver<PacerMessage>,
    playing_filler: bool,
    schedule: Schedule,
    silence_frames: u8,
    sleeper: SpinSleeper,
    source: Option<Box<dyn AudioSource>>,
    speaking: bool,
}

impl Pacer {
    pub(crate) fn new(pacer_rx: Receiver<PacerMessage>, config: Config, halt: Arc<AtomicBool>) -> Self {
        Self {
            muted: config.self_mute,
            config,
            conn_active: None,
            filler: None,
            halt,
            pacer_rx,
            playing_filler: false,
            schedule: Schedule::new(TIMESTEP_LENGTH),
            silence_frames: 0,
            sleeper: SpinSleeper::default(),
            source: None,
            speaking: false,
        }
    }

    fn run(&mut self) {
        'runner: loop {
            loop {
                // With no transport there is nothing to pace: sleep until told otherwise.
                let msg = if self.conn_active.is_none() {
                    self.pacer_rx.recv().map_err(|_| TryRecvError::Disconnected)
                } else {
                    self.pacer_rx.try_recv()
                };

                match msg {
                    Ok(msg) => {
                        if !self.handle(msg) {
                            break 'runner;
                        }
                    },
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'runner,
                }
            }

            if self.halt.load(Ordering::Acquire) {
                break;
            }

            self.tick();
            self.march_deadline();
        }
    }

    /// Applies one control message. Returns `false` when the pacer should exit.
    ///
    /// Messages are only handled between ticks, so a source swap can never land mid-tick.
    fn handle(&mut self, msg: PacerMessage) -> bool {
        use PacerMessage::*;

        match msg {
            SetSource(source) => {
                self.source = source;
                self.playing_filler = false;
                if self.source.is_none() {
                    self.fall_back();
                }
            },
            SetFiller(filler) => {
                if self.playing_filler {
                    self.source = None;
                    self.playing_filler = false;
                }
                self.filler = filler;
                if self.source.is_none() {
                    self.fall_back();
                }
            },
            SetMute(muted) => {
                self.muted = muted;
            },
            SetConn(conn) => {
                self.conn_active = Some(conn);
                self.speaking = false;
                self.silence_frames = 0;
                self.schedule.restart();
            },
            DropConn => {
                self.conn_active = None;
            },
            Poison => return false,
        }

        true
    }

    /// Runs one tick: polls the active source and sends at most one frame.
    fn tick(&mut self) {
        let polled = if self.muted {
            Polled::Nothing
        } else {
            self.poll_source()
        };

        match polled {
            Polled::Audio(frame) => {
                self.silence_frames = self.config.trailing_silence_frames;
                self.set_speaking(true);
                self.send(&frame);
            },
            Polled::Silence => {
                self.trail_off();
                self.send(&SILENT_FRAME);
            },
            Polled::Nothing => {
                if self.trail_off() {
                    self.send(&SILENT_FRAME);
                }
            },
        }
    }

    fn poll_source(&mut self) -> Polled {
        let Some(source) = self.source.as_mut() else {
            return Polled::Nothing;
        };

        let result = catch_unwind(AssertUnwindSafe(|| {
            if source.has_next_frame() {
                let polled = match source.next_frame() {
                    Some(_) if source.is_muted() => Polled::Silence,
                    Some(frame) => Polled::Audio(frame),
                    None => Polled::Nothing,
                };

                (polled, false)
            } else {
                (Polled::Nothing, source.has_finished())
            }
        }));

        match result {
            Ok((polled, finished)) => {
                if finished {
                    debug!("Audio source finished.");
                    self.end_source();
                }

                polled
            },
            Err(_) => {
                error!("Audio source panicked while being polled; treating it as finished.");
                self.end_source();

                Polled::Nothing
            },
        }
    }

    fn end_source(&mut self) {
        let was_filler = self.playing_filler;

        self.source = None;
        self.playing_filler = false;

        if !was_filler && self.config.on_finish == FinishBehaviour::Fallback {
            self.fall_back();
        }
    }

    fn fall_back(&mut self) {
        if let Some(filler) = &self.filler {
            trace!("Falling back to filler source.");
            self.source = Some(filler.copy());
            self.playing_filler = true;
        }
    }

    /// Counts down trailing silence, returning whether a sentinel is still owed this tick.
    ///
    /// Clears the speaking flag once the countdown is spent.
    fn trail_off(&mut self) -> bool {
        if self.silence_frames > 0 {
            self.silence_frames -= 1;
            true
        } else {
            self.set_speaking(false);
            false
        }
    }

    fn set_speaking(&mut self, speaking: bool) {
        if self.speaking == speaking {
            return;
        }

        self.speaking = speaking;

        if let Some(ws) = self.conn_active.as_ref().and_then(|c| c.ws.as_ref()) {
            // The session may already be gone; the core task cleans up after it.
            drop(ws.send(WsMessage::Speaking(speaking)));
        }
    }

    fn send(&mut self, frame: &[u8]) {
        let Some(conn) = self.conn_active.as_mut() else {
            return;
        };

        match conn.sink.send_frame(frame) {
            Ok(()) => {},
            Err(SinkError::Closed) => {
                error!("Voice transport closed; pausing until a new session is attached.");
                self.conn_active = None;
            },
            Err(e) => {
                warn!("Dropped a frame: {}.", e);
            },
        }
    }

    fn march_deadline(&mut self) {
        let deadline = self.schedule.advance();
        let now = Instant::now();

        if let Some(wait) = deadline.checked_duration_since(now) {
            self.sleeper.sleep(wait);
        } else {
            warn!("Frame pacer overran its tick by {:?}.", now - deadline);

            let skipped = self.schedule.skip_missed(now);
            if skipped > 0 {
                warn!("Frame pacer skipped {} missed ticks.", skipped);
            }
        }
    }
}

/// The pacing thread is synchronous due to its strict timing requirements.
pub(crate) fn runner(pacer_rx: Receiver<PacerMessage>, config: Config, halt: Arc<AtomicBool>) {
    info!("Frame pacer started.");

    let mut pacer = Pacer::new(pacer_rx, config, halt);
    pacer.run();

    info!("Frame pacer finished.");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::driver::sink::FrameSink;
    use crate::input::{BoundedSilence, ConstantSilence, Memory};

    type Sent = Arc<Mutex<Vec<(Instant, Vec<u8>)>>>;

    struct Collect {
        sent: Sent,
        cost: Duration,
        stop_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl FrameSink for Collect {
        fn send_frame(&mut self, frame: &[u8]) -> Result<(), SinkError> {
            let mut sent = self.sent.lock();
            sent.push((Instant::now(), frame.to_vec()));

            if let Some((limit, halt)) = &self.stop_after {
                if sent.len() >= *limit {
                    halt.store(true, Ordering::Release);
                }
            }
            drop(sent);

            std::thread::sleep(self.cost);
            Ok(())
        }
    }

    struct Endless(u8);

    impl AudioSource for Endless {
        fn next_frame(&mut self) -> Option<Vec<u8>> {
            self.0 = self.0.wrapping_add(1);
            Some(vec![self.0; 20])
        }

        fn has_next_frame(&mut self) -> bool {
            true
        }

        fn has_finished(&self) -> bool {
            false
        }

        fn is_muted(&self) -> bool {
            false
        }

        fn set_muted(&mut self, _muted: bool) {}

        fn copy(&self) -> Box<dyn AudioSource> {
            Box::new(Endless(0))
        }
    }

    struct Faulty;

    impl AudioSource for Faulty {
        fn next_frame(&mut self) -> Option<Vec<u8>> {
            panic!("decoder fault");
        }

        fn has_next_frame(&mut self) -> bool {
            true
        }

        fn has_finished(&self) -> bool {
            false
        }

        fn is_muted(&self) -> bool {
            false
        }

        fn set_muted(&mut self, _muted: bool) {}

        fn copy(&self) -> Box<dyn AudioSource> {
            Box::new(Faulty)
        }
    }

    struct Harness {
        pacer: Pacer,
        sent: Sent,
        ws_rx: flume::Receiver<WsMessage>,
        _pacer_tx: flume::Sender<PacerMessage>,
    }

    impl Harness {
        fn new(config: Config) -> Self {
            let (pacer_tx, pacer_rx) = flume::unbounded();
            let (ws_tx, ws_rx) = flume::unbounded();
            let sent = Sent::default();

            let mut pacer = Pacer::new(pacer_rx, config, Arc::default());
            pacer.handle(PacerMessage::SetConn(PacerConnection {
                sink: Box::new(Collect {
                    sent: Arc::clone(&sent),
                    cost: Duration::ZERO,
                    stop_after: None,
                }),
                ws: Some(ws_tx),
            }));

            Self {
                pacer,
                sent,
                ws_rx,
                _pacer_tx: pacer_tx,
            }
        }

        fn ticks(&mut self, n: usize) {
            for _ in 0..n {
                self.pacer.tick();
            }
        }

        fn take_frames(&self) -> Vec<Vec<u8>> {
            self.sent.lock().drain(..).map(|(_, f)| f).collect()
        }

        fn speaking(&self) -> Vec<bool> {
            self.ws_rx
                .try_iter()
                .filter_map(|m| match m {
                    WsMessage::Speaking(s) => Some(s),
                    WsMessage::Poison => None,
                })
                .collect()
        }
    }

    #[test]
    fn ticks_follow_absolute_schedule() {
        const TICKS: usize = 50;

        let (pacer_tx, pacer_rx) = flume::unbounded();
        let halt = Arc::new(AtomicBool::new(false));
        let sent = Sent::default();

        pacer_tx.send(PacerMessage::SetSource(Some(Box::new(Endless(0))))).unwrap();
        pacer_tx
            .send(PacerMessage::SetConn(PacerConnection {
                sink: Box::new(Collect {
                    sent: Arc::clone(&sent),
                    // Per-tick cost which a relative sleep would accumulate.
                    cost: Duration::from_millis(5),
                    stop_after: Some((TICKS, Arc::clone(&halt))),
                }),
                ws: None,
            }))
            .unwrap();

        let mut pacer = Pacer::new(pacer_rx, Config::default(), Arc::clone(&halt));
        pacer.run();

        let sent = sent.lock();
        assert_eq!(sent.len(), TICKS);

        let first = sent[0].0;
        let elapsed = sent[TICKS - 1].0 - first;
        let nominal = TIMESTEP_LENGTH * (TICKS as u32 - 1);

        assert!(elapsed + Duration::from_millis(2) >= nominal, "ran early: {elapsed:?}");
        assert!(elapsed < nominal + Duration::from_millis(100), "drifted: {elapsed:?}");

        for (n, (at, _)) in sent.iter().enumerate() {
            let due = first + TIMESTEP_LENGTH * n as u32;
            assert!(*at + Duration::from_millis(2) >= due, "tick {n} ran early");
        }
    }

    #[test]
    fn halted_pacer_sends_nothing() {
        let (pacer_tx, pacer_rx) = flume::unbounded();
        let halt = Arc::new(AtomicBool::new(true));
        let sent = Sent::default();

        pacer_tx.send(PacerMessage::SetSource(Some(Box::new(Endless(0))))).unwrap();
        pacer_tx
            .send(PacerMessage::SetConn(PacerConnection {
                sink: Box::new(Collect {
                    sent: Arc::clone(&sent),
                    cost: Duration::ZERO,
                    stop_after: None,
                }),
                ws: None,
            }))
            .unwrap();

        Pacer::new(pacer_rx, Config::default(), halt).run();

        assert!(sent.lock().is_empty());
    }

    #[test]
    fn poison_stops_idle_pacer() {
        let (pacer_tx, pacer_rx) = flume::unbounded();
        pacer_tx.send(PacerMessage::Poison).unwrap();

        // Would block forever waiting for a connection if poison were ignored.
        Pacer::new(pacer_rx, Config::default(), Arc::default()).run();
    }

    #[test]
    fn audio_raises_speaking_then_trails_off() {
        let mut harness = Harness::new(Config::default().trailing_silence_frames(2));
        harness
            .pacer
            .handle(PacerMessage::SetSource(Some(Box::new(Memory::new(vec![vec![1], vec![2]])))));

        harness.ticks(6);

        assert_eq!(
            harness.take_frames(),
            vec![vec![1], vec![2], SILENT_FRAME.to_vec(), SILENT_FRAME.to_vec()]
        );
        assert_eq!(harness.speaking(), vec![true, false]);
    }

    #[test]
    fn muted_pacer_skips_production() {
        let mut harness = Harness::new(Config::default().trailing_silence_frames(0));
        let source = Memory::new(vec![vec![1], vec![2]]);
        harness.pacer.handle(PacerMessage::SetSource(Some(Box::new(source))));

        harness.pacer.handle(PacerMessage::SetMute(true));
        harness.ticks(3);
        assert!(harness.take_frames().is_empty());

        harness.pacer.handle(PacerMessage::SetMute(false));
        harness.ticks(1);
        // Nothing was consumed while muted.
        assert_eq!(harness.take_frames(), vec![vec![1]]);
    }

    #[test]
    fn muted_source_sends_sentinel_without_speaking() {
        let mut harness = Harness::new(Config::default());
        let mut source = Memory::new(vec![vec![9]; 3]);
        source.set_muted(true);
        harness.pacer.handle(PacerMessage::SetSource(Some(Box::new(source))));

        harness.ticks(3);

        assert_eq!(harness.take_frames(), vec![SILENT_FRAME.to_vec(); 3]);
        assert!(harness.speaking().is_empty());
    }

    #[test]
    fn finished_source_falls_back_to_filler_copy() {
        let mut harness = Harness::new(Config::default().trailing_silence_frames(0));
        let filler = BoundedSilence::from_ticks(2);
        harness.pacer.handle(PacerMessage::SetFiller(Some(Box::new(filler))));
        harness
            .pacer
            .handle(PacerMessage::SetSource(Some(Box::new(Memory::new(vec![vec![1]])))));

        // Audio, then the exhausted source is noticed on its next poll.
        harness.ticks(2);
        assert!(harness.pacer.playing_filler);

        // The filler's countdown runs from its initial duration, then it is dropped for good.
        harness.ticks(1);
        assert!(harness.pacer.playing_filler);
        harness.ticks(1);
        assert!(harness.pacer.source.is_none());
        assert!(!harness.pacer.playing_filler);

        assert_eq!(harness.take_frames(), vec![vec![1]]);
    }

    #[test]
    fn constant_filler_fills_gaps() {
        let mut harness = Harness::new(Config::default().trailing_silence_frames(0));
        harness.pacer.handle(PacerMessage::SetFiller(Some(Box::new(ConstantSilence))));

        harness.ticks(4);

        assert_eq!(harness.take_frames(), vec![SILENT_FRAME.to_vec(); 4]);

        harness
            .pacer
            .handle(PacerMessage::SetSource(Some(Box::new(Memory::new(vec![vec![5]])))));
        harness.ticks(1);

        assert_eq!(harness.take_frames(), vec![vec![5]]);
    }

    #[test]
    fn clearing_source_resumes_filler() {
        let mut harness = Harness::new(Config::default().trailing_silence_frames(0));
        harness.pacer.handle(PacerMessage::SetFiller(Some(Box::new(ConstantSilence))));
        harness
            .pacer
            .handle(PacerMessage::SetSource(Some(Box::new(Memory::new(vec![vec![1]; 10])))));
        harness.ticks(2);

        harness.pacer.handle(PacerMessage::SetSource(None));

        assert!(harness.pacer.playing_filler);
        harness.ticks(3);

        assert_eq!(
            harness.take_frames(),
            vec![
                vec![1],
                vec![1],
                SILENT_FRAME.to_vec(),
                SILENT_FRAME.to_vec(),
                SILENT_FRAME.to_vec(),
            ]
        );
    }

    #[test]
    fn clearing_source_without_filler_goes_quiet() {
        let mut harness = Harness::new(Config::default().trailing_silence_frames(0));
        harness
            .pacer
            .handle(PacerMessage::SetSource(Some(Box::new(Memory::new(vec![vec![1]; 10])))));
        harness.ticks(1);

        harness.pacer.handle(PacerMessage::SetSource(None));
        harness.ticks(3);

        assert!(harness.pacer.source.is_none());
        assert_eq!(harness.take_frames(), vec![vec![1]]);
    }

    #[test]
    fn stop_behaviour_ignores_filler() {
        let config = Config::default().on_finish(FinishBehaviour::Stop).trailing_silence_frames(0);
        let mut harness = Harness::new(config);
        harness.pacer.handle(PacerMessage::SetFiller(Some(Box::new(ConstantSilence))));
        harness
            .pacer
            .handle(PacerMessage::SetSource(Some(Box::new(Memory::new(vec![vec![1]])))));

        harness.ticks(5);

        assert_eq!(harness.take_frames(), vec![vec![1]]);
        assert!(harness.pacer.source.is_none());
    }

    #[test]
    fn swap_abandons_outgoing_source() {
        let mut harness = Harness::new(Config::default().trailing_silence_frames(0));
        harness
            .pacer
            .handle(PacerMessage::SetSource(Some(Box::new(Memory::new(vec![vec![1], vec![2]])))));
        harness.ticks(1);

        harness
            .pacer
            .handle(PacerMessage::SetSource(Some(Box::new(Memory::new(vec![vec![7]])))));
        harness.ticks(1);

        assert_eq!(harness.take_frames(), vec![vec![1], vec![7]]);
    }

    #[test]
    fn panicking_source_is_swapped_out() {
        let mut harness = Harness::new(Config::default().trailing_silence_frames(0));
        harness.pacer.handle(PacerMessage::SetFiller(Some(Box::new(ConstantSilence))));
        harness.pacer.handle(PacerMessage::SetSource(Some(Box::new(Faulty))));

        harness.ticks(2);

        assert!(harness.pacer.playing_filler);
        assert_eq!(harness.take_frames(), vec![SILENT_FRAME.to_vec()]);
    }

    #[test]
    fn closed_sink_detaches_transport() {
        struct Gone;

        impl FrameSink for Gone {
            fn send_frame(&mut self, _frame: &[u8]) -> Result<(), SinkError> {
                Err(SinkError::Closed)
            }
        }

        let mut harness = Harness::new(Config::default());
        harness.pacer.handle(PacerMessage::SetConn(PacerConnection {
            sink: Box::new(Gone),
            ws: None,
        }));
        harness.pacer.handle(PacerMessage::SetSource(Some(Box::new(Endless(0)))));

        harness.ticks(1);

        assert!(harness.pacer.conn_active.is_none());
    }
}
