use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{debug, info};
use r1802_core::constants::ports::{PORT_PSG_DATA, PORT_PSG_SELECT};
use r1802_core::constants::psg::SAMPLE_RATE;
use r1802_core::constants::timing::SLICE_MICROS;
use r1802_core::memory::mods::IoPeriph;
use r1802_core::psg::Psg;

use std::io::{self, Write};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Register write queued for the tone generator: (selector, data)
pub type PsgWrite = (u8, u8);

/// CPU side of the sound hardware. The select port latches a register
/// selector; every data port write forwards (selector, data) to the audio
/// thread.
pub struct SoundPeriph {
    selector: u8,
    tx: Sender<PsgWrite>,
}

impl SoundPeriph {
    pub fn new(tx: Sender<PsgWrite>) -> Self {
        SoundPeriph { selector: 0, tx }
    }
}

impl IoPeriph for SoundPeriph {
    fn read(&mut self, _port: u8) -> Option<u8> {
        None
    }

    fn write(&mut self, port: u8, value: u8) {
        match port {
            PORT_PSG_SELECT => self.selector = value,
            PORT_PSG_DATA => {
                if self.tx.send((self.selector, value)).is_err() {
                    debug!("Audio thread gone, dropping PSG write");
                }
            }
            _ => {}
        }
    }
}

/// Tone generator fed from the register write queue
pub struct Mixer {
    psg: Psg,
    rx: Receiver<PsgWrite>,
    open: bool,
}

impl Mixer {
    pub fn new(rx: Receiver<PsgWrite>) -> Self {
        Mixer {
            psg: Psg::new(),
            rx,
            open: true,
        }
    }

    /// False once every sender is gone and the queue is drained
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn psg(&self) -> &Psg {
        &self.psg
    }

    /// Applies all pending register writes, then renders one stereo frame
    pub fn next_frame(&mut self) -> (i16, i16) {
        loop {
            match self.rx.try_recv() {
                Ok((selector, data)) => self.psg.set(selector, data),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.open = false;
                    break;
                }
            }
        }
        self.psg.update()
    }
}

// Frames rendered per pacing block
const BLOCK_FRAMES: usize = (SAMPLE_RATE as u64 * SLICE_MICROS / 1_000_000) as usize;

fn audio_thread(mut mixer: Mixer, mut sink: Option<Box<dyn Write + Send>>) -> io::Result<u64> {
    let block = Duration::from_micros(SLICE_MICROS);
    let mut pcm = Vec::with_capacity(BLOCK_FRAMES * 4);
    let mut frames: u64 = 0;
    let mut deadline = Instant::now();

    while mixer.is_open() {
        pcm.clear();
        for _ in 0..BLOCK_FRAMES {
            let (left, right) = mixer.next_frame();
            pcm.extend_from_slice(&left.to_le_bytes());
            pcm.extend_from_slice(&right.to_le_bytes());
        }
        frames += BLOCK_FRAMES as u64;

        if let Some(out) = sink.as_mut() {
            out.write_all(&pcm)?;
        }

        deadline += block;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            // Behind real time, do not try to catch up
            deadline = now;
        }
    }

    if let Some(out) = sink.as_mut() {
        out.flush()?;
    }
    Ok(frames)
}

/// Real-time audio thread rendering 48 kHz stereo. Samples go to the
/// optional sink as interleaved s16le; without one they are discarded.
/// The thread ends once all `SoundPeriph` senders are dropped.
pub struct AudioPump {
    handle: JoinHandle<io::Result<u64>>,
}

impl AudioPump {
    pub fn spawn(rx: Receiver<PsgWrite>, sink: Option<Box<dyn Write + Send>>) -> Self {
        let mixer = Mixer::new(rx);
        let handle = thread::spawn(move || audio_thread(mixer, sink));
        AudioPump { handle }
    }

    /// Waits for the thread to finish, returning the number of frames rendered
    pub fn join(self) -> io::Result<u64> {
        let frames = self
            .handle
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audio thread panicked"))??;
        info!("Audio: {} frames rendered", frames);
        Ok(frames)
    }
}
