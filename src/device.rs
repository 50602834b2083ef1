use core::fmt::Write;

use esp_hal::efuse::Efuse;
use esp_hal::rng::Rng;

/// Factory MAC as lowercase hex without separators, e.g. `a0b1c2d3e4f5`. Stable per chip, so
/// it doubles as the MQTT client id suffix.
pub fn get_device_id() -> heapless::String<12> {
    let mut s = heapless::String::new();
    for byte in Efuse::mac_address() {
        let _ = write!(s, "{:02x}", byte);
    }
    s
}

/// The SoC RNG behind the `rand_core` traits the TLS handshake draws from. It is only a true
/// entropy source while the radio is running.
pub struct HardwareRng(Rng);

impl HardwareRng {
    pub fn new() -> Self {
        Self(Rng::new())
    }
}

impl rand_core::RngCore for HardwareRng {
    fn next_u32(&mut self) -> u32 {
        self.0.random()
    }

    fn next_u64(&mut self) -> u64 {
        u64::from(self.0.random()) | (u64::from(self.0.random()) << 32)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let word = self.0.random().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl rand_core::CryptoRng for HardwareRng {}
