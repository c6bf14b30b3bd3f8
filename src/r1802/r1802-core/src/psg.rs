use crate::constants::psg::*;
use log::warn;

/// One tone generator voice
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Channel {
    pub count: u16,    // Phase accumulator
    pub delta: u16,    // Phase increment per sample
    pub left: u8,      // Left volume
    pub right: u8,     // Right volume
    pub wave: u8,      // Waveform select, 0-7
    delta_stage: u8,   // Low delta byte awaiting the high byte
    volume_stage: u8,  // Left volume awaiting the right volume
}

impl Channel {
    fn is_silent(&self) -> bool {
        self.left == 0 && self.right == 0
    }

    fn is_noise(&self) -> bool {
        self.delta & NOISE_BAND == NOISE_BAND
    }

    /// Waveform value at the current phase
    fn waveform(&self) -> i16 {
        let count = self.count;
        let pulse = |hit: bool| if hit { -AMPLITUDE } else { AMPLITUDE };
        match self.wave {
            1 => pulse(count & 0xC000 != 0),
            2 => pulse(count & 0xE000 != 0),
            3 => pulse(count & 0xC000 == 0xC000),
            4 => triangle(count, count & 0x8000 != 0),
            5 => ((0x7FFF - count as i32) >> 1) as i16,
            6 => triangle(count, count & 0x8000 == 0),
            7 => ((count as i32 - 0x7FFF) >> 1) as i16,
            _ => pulse(count & 0x8000 != 0),
        }
    }
}

// Rises over the first quarter, falls over the second, mirrored below zero
fn triangle(count: u16, negate: bool) -> i16 {
    let mut t = (count as i32) << 1 & 0x7FFF;
    if count & 0x4000 != 0 {
        t = 0x7FFF - t;
    }
    if negate {
        t = -t;
    }
    t as i16
}

/// 32-voice phase accumulator tone and noise generator
pub struct Psg {
    channels: [Channel; CHANNELS],
    rng: u32,     // 17-bit LFSR shared by all noise voices
    clips: u32,   // Clamped output values since the last report
    samples: u32, // Samples since the last report
}

impl Psg {
    pub fn new() -> Self {
        Self {
            channels: [Channel::default(); CHANNELS],
            rng: NOISE_SEED,
            clips: 0,
            samples: 0,
        }
    }

    /// Silence and clear every channel
    pub fn mute(&mut self) {
        self.channels = [Channel::default(); CHANNELS];
    }

    pub fn channel(&self, index: usize) -> &Channel {
        &self.channels[index]
    }

    pub fn clips(&self) -> u32 {
        self.clips
    }

    /// Register write. Bits 7-3 of `selector` pick the channel, bits 2-0
    /// the register; unknown registers are ignored.
    pub fn set(&mut self, selector: u8, data: u8) {
        let ch = &mut self.channels[(selector >> 3) as usize];
        match selector & 7 {
            REG_DELTA_LO => ch.delta_stage = data,
            REG_DELTA_HI => ch.delta = (data as u16) << 8 | ch.delta_stage as u16,
            REG_VOLUME_LEFT => ch.volume_stage = data,
            REG_VOLUME_RIGHT => {
                ch.left = ch.volume_stage;
                ch.right = data;
                if ch.is_silent() {
                    ch.count = 0;
                }
            }
            REG_WAVE_TYPE => ch.wave = data & 7,
            _ => {}
        }
    }

    fn noise(&mut self) -> i16 {
        self.rng = self.rng >> 1 | ((self.rng >> 2 ^ self.rng >> 3) & 1) << 16;
        if self.rng & 1 != 0 {
            -AMPLITUDE
        } else {
            AMPLITUDE
        }
    }

    fn clamp(&mut self, sum: i32) -> i16 {
        let sum = sum >> ATTENUATION;
        if sum < i16::MIN as i32 {
            self.clips += 1;
            i16::MIN
        } else if sum > i16::MAX as i32 {
            self.clips += 1;
            i16::MAX
        } else {
            sum as i16
        }
    }

    /// Produce one stereo sample pair and advance every audible channel
    pub fn update(&mut self) -> (i16, i16) {
        let mut left: i32 = 0;
        let mut right: i32 = 0;

        for i in 0..CHANNELS {
            if self.channels[i].is_silent() {
                continue;
            }
            let t = if self.channels[i].is_noise() {
                self.noise()
            } else {
                let ch = &mut self.channels[i];
                ch.count = ch.count.wrapping_add(ch.delta);
                ch.waveform()
            };
            let ch = &self.channels[i];
            left += t as i32 * ch.left as i32;
            right += t as i32 * ch.right as i32;
        }

        let out = (self.clamp(left), self.clamp(right));

        self.samples += 1;
        if self.samples >= SAMPLE_RATE {
            if self.clips > 0 {
                warn!("PSG: {} samples clipped.", self.clips);
            }
            self.samples = 0;
            self.clips = 0;
        }
        out
    }
}

impl Default for Psg {
    fn default() -> Self {
        Self::new()
    }
}
