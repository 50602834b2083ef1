use crate::sensors::{ParticulateError, ParticulateSensor};
use crate::state::ParticulateReading;

pub const PMSA003I_ADDRESS: u8 = 0x12;

const FRAME_START_1: u8 = 0x42;
const FRAME_START_2: u8 = 0x4D;
const EXPECTED_FRAME_LEN: u16 = 28;
const FRAME_SIZE: usize = 32;
const CHECKSUMMED_LEN: usize = 30; // Everything before the checksum itself

/// Plantower PMSA003I on I2C. Every read returns one complete, freshly latched frame.
pub struct Pmsa003i<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: embedded_hal_async::i2c::I2c> Pmsa003i<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            address: PMSA003I_ADDRESS,
        }
    }

    pub async fn read_frame(&mut self) -> Result<ParticulateReading, ParticulateError> {
        let mut frame = [0u8; FRAME_SIZE];
        self.i2c
            .read(self.address, &mut frame)
            .await
            .map_err(|_| ParticulateError::Bus)?;
        parse_frame(&frame)
    }
}

impl<I2C: embedded_hal_async::i2c::I2c> ParticulateSensor for Pmsa003i<I2C> {
    async fn read(&mut self) -> Result<ParticulateReading, ParticulateError> {
        self.read_frame().await
    }
}

pub(crate) fn parse_frame(frame: &[u8; FRAME_SIZE]) -> Result<ParticulateReading, ParticulateError> {
    if frame[0] != FRAME_START_1 || frame[1] != FRAME_START_2 {
        return Err(ParticulateError::Header);
    }

    let frame_len = u16::from_be_bytes([frame[2], frame[3]]);
    if frame_len != EXPECTED_FRAME_LEN {
        return Err(ParticulateError::FrameLen);
    }

    if !verify_checksum(frame) {
        return Err(ParticulateError::Checksum);
    }

    let word = |i: usize| u16::from_be_bytes([frame[i], frame[i + 1]]);

    // 4..10 standard concentrations, 10..16 atmospheric (unused), 16..28 counts.
    Ok(ParticulateReading {
        pm1: word(4),
        pm25: word(6),
        pm10: word(8),
        pm03_count: word(16),
        pm05_count: word(18),
        pm10_count: word(20),
        pm25_count: word(22),
        pm50_count: word(24),
        pm100_count: word(26),
    })
}

fn verify_checksum(frame: &[u8; FRAME_SIZE]) -> bool {
    let mut sum: u16 = 0;
    for &byte in frame.iter().take(CHECKSUMMED_LEN) {
        sum = sum.wrapping_add(byte as u16);
    }

    let expected_sum = u16::from_be_bytes([frame[30], frame[31]]);
    sum == expected_sum
}
