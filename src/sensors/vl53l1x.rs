use crate::sensors::{RangingError, RangingSensor};

pub const VL53L1X_ADDRESS: u8 = 0x29;

// Registers (16-bit addresses)
const VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND: u16 = 0x0008;
const VHV_CONFIG_INIT: u16 = 0x000B;
const DEFAULT_CONFIG_START: u16 = 0x002D;
const GPIO_HV_MUX_CTRL: u16 = 0x0030;
const GPIO_TIO_HV_STATUS: u16 = 0x0031;
const PHASECAL_CONFIG_TIMEOUT_MACROP: u16 = 0x004B;
const RANGE_CONFIG_TIMEOUT_MACROP_A_HI: u16 = 0x005E;
const RANGE_CONFIG_VCSEL_PERIOD_A: u16 = 0x0060;
const RANGE_CONFIG_TIMEOUT_MACROP_B_HI: u16 = 0x0061;
const RANGE_CONFIG_VCSEL_PERIOD_B: u16 = 0x0063;
const RANGE_CONFIG_VALID_PHASE_HIGH: u16 = 0x0069;
const SD_CONFIG_WOI_SD0: u16 = 0x0078;
const SD_CONFIG_INITIAL_PHASE_SD0: u16 = 0x007A;
const SYSTEM_INTERRUPT_CLEAR: u16 = 0x0086;
const SYSTEM_MODE_START: u16 = 0x0087;
const RESULT_RANGE_STATUS: u16 = 0x0089;
const RESULT_FINAL_CROSSTALK_CORRECTED_RANGE_MM_SD0: u16 = 0x0096;
const IDENTIFICATION_MODEL_ID: u16 = 0x010F;

// Identification
const MODEL_ID: u8 = 0xEA;
const MODULE_TYPE: u8 = 0xCC;
const MASK_REVISION: u8 = 0x10;

const MODE_START_RANGING: u8 = 0x40;
const MODE_STOP: u8 = 0x00;
const INTERRUPT_CLEAR: u8 = 0x01;
const RANGE_STATUS_MASK: u8 = 0x1F;
const RANGE_STATUS_VALID: u8 = 0x09;

// Boot calibration timing
const CALIBRATION_POLL_MS: u64 = 10;
const CALIBRATION_MAX_POLLS: u32 = 100;

/// ST's default configuration, written as one block starting at 0x2D.
const DEFAULT_CONFIGURATION: [u8; 91] = [
    0x00, // 0x2d: fast plus mode off
    0x00, // 0x2e: I2C pulled up at 1.8V
    0x00, // 0x2f: GPIO pulled up at 1.8V
    0x01, // 0x30: interrupt active high
    0x02, // 0x31
    0x00, 0x02, 0x08, 0x00, 0x08, 0x10, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x0F,
    0x00, 0x00, 0x00, 0x00, 0x00, // 0x32..=0x45
    0x20, // 0x46: interrupt on new sample ready
    0x0B, 0x00, 0x00, 0x02, 0x0A, 0x21, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0xC8, 0x00,
    0x00, 0x38, 0xFF, 0x01, 0x00, 0x08, 0x00, 0x00, 0x01, 0xCC, 0x0F, 0x01, 0xF1,
    0x0D, // 0x47..=0x63
    0x01, 0x68, // 0x64..=0x65: sigma threshold
    0x00, 0x80, // 0x66..=0x67: min count rate
    0x08, 0xB8, 0x00, 0x00, // 0x68..=0x6b
    0x00, 0x00, 0x0F, 0x89, // 0x6c..=0x6f: intermeasurement period
    0x00, 0x00, // 0x70..=0x71
    0x00, 0x00, 0x00, 0x00, // 0x72..=0x75: distance thresholds
    0x00, 0x01, 0x0F, 0x0D, 0x0E, 0x0E, 0x00, 0x00, 0x02, // 0x76..=0x7e
    0xC7, // 0x7f: ROI centre
    0xFF, // 0x80: ROI size
    0x9B, 0x00, 0x00, 0x00, 0x01, // 0x81..=0x85
    0x00, // 0x86: interrupt clear
    0x00, // 0x87: ranging stopped
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DistanceMode {
    /// Up to ~1.3 m, better ambient immunity.
    Short,
    /// Up to ~4 m.
    Long,
}

struct ModeSettings {
    phasecal_timeout: u8,
    vcsel_period_a: u8,
    vcsel_period_b: u8,
    valid_phase_high: u8,
    woi_sd0: u16,
    initial_phase_sd0: u16,
}

impl DistanceMode {
    const fn settings(self) -> ModeSettings {
        match self {
            DistanceMode::Short => ModeSettings {
                phasecal_timeout: 0x14,
                vcsel_period_a: 0x07,
                vcsel_period_b: 0x05,
                valid_phase_high: 0x38,
                woi_sd0: 0x0705,
                initial_phase_sd0: 0x0606,
            },
            DistanceMode::Long => ModeSettings {
                phasecal_timeout: 0x0A,
                vcsel_period_a: 0x0F,
                vcsel_period_b: 0x0D,
                valid_phase_high: 0xB8,
                woi_sd0: 0x0F0D,
                initial_phase_sd0: 0x0E0E,
            },
        }
    }

    /// Macro-period timeouts (A, B) for a timing budget.
    const fn timeouts(self, budget_ms: u16) -> Option<(u16, u16)> {
        match (self, budget_ms) {
            (DistanceMode::Short, 15) => Some((0x001D, 0x0027)),
            (DistanceMode::Short, 20) => Some((0x0051, 0x006E)),
            (DistanceMode::Short, 33) => Some((0x00D6, 0x006E)),
            (DistanceMode::Short, 50) => Some((0x01AE, 0x01E8)),
            (DistanceMode::Short, 100) => Some((0x02E1, 0x0388)),
            (DistanceMode::Short, 200) => Some((0x03E1, 0x0496)),
            (DistanceMode::Short, 500) => Some((0x0591, 0x05C1)),
            (DistanceMode::Long, 20) => Some((0x001E, 0x0022)),
            (DistanceMode::Long, 33) => Some((0x0060, 0x006E)),
            (DistanceMode::Long, 50) => Some((0x00AD, 0x00C6)),
            (DistanceMode::Long, 100) => Some((0x01CC, 0x01EA)),
            (DistanceMode::Long, 200) => Some((0x02D9, 0x02F8)),
            (DistanceMode::Long, 500) => Some((0x048F, 0x04A4)),
            _ => None,
        }
    }
}

pub struct Vl53l1x<I2C> {
    i2c: I2C,
    address: u8,
    mode: DistanceMode,
}

impl<I2C> Vl53l1x<I2C>
where
    I2C: embedded_hal_async::i2c::I2c,
{
    /// Create a new VL53L1X driver instance
    ///
    /// Note: You must call `init()` before ranging
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            address: VL53L1X_ADDRESS,
            mode: DistanceMode::Long,
        }
    }

    /// Identify the sensor, load the default configuration and run VHV calibration.
    ///
    /// Leaves ranging stopped.
    pub async fn init(&mut self) -> Result<(), RangingError> {
        let mut id = [0u8; 3];
        self.read_register(IDENTIFICATION_MODEL_ID, &mut id).await?;
        if id != [MODEL_ID, MODULE_TYPE, MASK_REVISION] {
            return Err(RangingError::WrongDevice);
        }

        self.write_register(DEFAULT_CONFIG_START, &DEFAULT_CONFIGURATION)
            .await?;

        // One throwaway measurement runs the VHV calibration.
        self.start_ranging().await?;
        let mut polls = 0;
        while !self.data_ready().await? {
            polls += 1;
            if polls >= CALIBRATION_MAX_POLLS {
                return Err(RangingError::BootTimeout);
            }
            embassy_time::Timer::after_millis(CALIBRATION_POLL_MS).await;
        }
        self.clear_interrupt().await?;
        self.stop_ranging().await?;

        self.write_register(VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND, &[0x09])
            .await?;
        self.write_register(VHV_CONFIG_INIT, &[0x00]).await?;
        Ok(())
    }

    pub async fn set_distance_mode(&mut self, mode: DistanceMode) -> Result<(), RangingError> {
        let s = mode.settings();
        self.write_register(PHASECAL_CONFIG_TIMEOUT_MACROP, &[s.phasecal_timeout])
            .await?;
        self.write_register(RANGE_CONFIG_VCSEL_PERIOD_A, &[s.vcsel_period_a])
            .await?;
        self.write_register(RANGE_CONFIG_VCSEL_PERIOD_B, &[s.vcsel_period_b])
            .await?;
        self.write_register(RANGE_CONFIG_VALID_PHASE_HIGH, &[s.valid_phase_high])
            .await?;
        self.write_register(SD_CONFIG_WOI_SD0, &s.woi_sd0.to_be_bytes())
            .await?;
        self.write_register(SD_CONFIG_INITIAL_PHASE_SD0, &s.initial_phase_sd0.to_be_bytes())
            .await?;
        self.mode = mode;
        Ok(())
    }

    /// Timing budgets are fixed per mode: 15 (short only), 20, 33, 50, 100, 200, 500 ms.
    pub async fn set_timing_budget(&mut self, budget_ms: u16) -> Result<(), RangingError> {
        let (a, b) = self
            .mode
            .timeouts(budget_ms)
            .ok_or(RangingError::UnsupportedTimingBudget(budget_ms))?;
        self.write_register(RANGE_CONFIG_TIMEOUT_MACROP_A_HI, &a.to_be_bytes())
            .await?;
        self.write_register(RANGE_CONFIG_TIMEOUT_MACROP_B_HI, &b.to_be_bytes())
            .await?;
        Ok(())
    }

    pub async fn start_ranging(&mut self) -> Result<(), RangingError> {
        self.write_register(SYSTEM_MODE_START, &[MODE_START_RANGING])
            .await
    }

    pub async fn stop_ranging(&mut self) -> Result<(), RangingError> {
        self.write_register(SYSTEM_MODE_START, &[MODE_STOP]).await
    }

    pub async fn data_ready(&mut self) -> Result<bool, RangingError> {
        let mut mux = [0u8; 1];
        self.read_register(GPIO_HV_MUX_CTRL, &mut mux).await?;
        // Bit 4 set means the interrupt line is active low.
        let ready_level = if mux[0] & 0x10 != 0 { 0 } else { 1 };

        let mut status = [0u8; 1];
        self.read_register(GPIO_TIO_HV_STATUS, &mut status).await?;
        Ok(status[0] & 0x01 == ready_level)
    }

    pub async fn clear_interrupt(&mut self) -> Result<(), RangingError> {
        self.write_register(SYSTEM_INTERRUPT_CLEAR, &[INTERRUPT_CLEAR])
            .await
    }

    /// Distance of the latched sample in millimetres.
    pub async fn distance_mm(&mut self) -> Result<u16, RangingError> {
        let mut status = [0u8; 1];
        self.read_register(RESULT_RANGE_STATUS, &mut status).await?;
        let status = status[0] & RANGE_STATUS_MASK;
        if status != RANGE_STATUS_VALID {
            return Err(RangingError::InvalidRange(status));
        }

        let mut range = [0u8; 2];
        self.read_register(RESULT_FINAL_CROSSTALK_CORRECTED_RANGE_MM_SD0, &mut range)
            .await?;
        Ok(u16::from_be_bytes(range))
    }

    async fn write_register(&mut self, reg: u16, data: &[u8]) -> Result<(), RangingError> {
        let mut buffer = [0u8; 2 + DEFAULT_CONFIGURATION.len()];
        let len = 2 + data.len();
        buffer[..2].copy_from_slice(&reg.to_be_bytes());
        buffer[2..len].copy_from_slice(data);
        self.i2c
            .write(self.address, &buffer[..len])
            .await
            .map_err(|_| RangingError::Bus)
    }

    async fn read_register(&mut self, reg: u16, buf: &mut [u8]) -> Result<(), RangingError> {
        self.i2c
            .write_read(self.address, &reg.to_be_bytes(), buf)
            .await
            .map_err(|_| RangingError::Bus)
    }
}

impl<I2C: embedded_hal_async::i2c::I2c> RangingSensor for Vl53l1x<I2C> {
    async fn sample_ready(&mut self) -> Result<bool, RangingError> {
        self.data_ready().await
    }

    async fn read_distance(&mut self) -> Result<u16, RangingError> {
        self.distance_mm().await
    }

    async fn clear_latch(&mut self) -> Result<(), RangingError> {
        self.clear_interrupt().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    const A: u8 = VL53L1X_ADDRESS;

    fn reg(r: u16) -> Vec<u8> {
        r.to_be_bytes().to_vec()
    }

    fn write(r: u16, data: &[u8]) -> Transaction {
        let mut bytes = reg(r);
        bytes.extend_from_slice(data);
        Transaction::write(A, bytes)
    }

    #[test]
    fn default_configuration_covers_0x2d_to_0x87() {
        assert_eq!(DEFAULT_CONFIGURATION.len(), 0x87 - 0x2D + 1);
        assert_eq!(DEFAULT_CONFIGURATION[(0x46 - 0x2D) as usize], 0x20);
        assert_eq!(DEFAULT_CONFIGURATION[(0x7F - 0x2D) as usize], 0xC7);
    }

    #[test]
    fn timing_budget_table() {
        assert_eq!(DistanceMode::Long.timeouts(200), Some((0x02D9, 0x02F8)));
        assert_eq!(DistanceMode::Short.timeouts(15), Some((0x001D, 0x0027)));
        assert_eq!(DistanceMode::Long.timeouts(15), None);
        assert_eq!(DistanceMode::Long.timeouts(42), None);
    }

    #[futures_test::test]
    async fn data_ready_follows_active_high_polarity() {
        let expectations = [
            Transaction::write_read(A, reg(GPIO_HV_MUX_CTRL), vec![0x01]),
            Transaction::write_read(A, reg(GPIO_TIO_HV_STATUS), vec![0x03]),
            Transaction::write_read(A, reg(GPIO_HV_MUX_CTRL), vec![0x01]),
            Transaction::write_read(A, reg(GPIO_TIO_HV_STATUS), vec![0x02]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Vl53l1x::new(i2c.clone());

        assert_eq!(sensor.sample_ready().await, Ok(true));
        assert_eq!(sensor.sample_ready().await, Ok(false));
        i2c.done();
    }

    #[futures_test::test]
    async fn data_ready_follows_active_low_polarity() {
        let expectations = [
            Transaction::write_read(A, reg(GPIO_HV_MUX_CTRL), vec![0x11]),
            Transaction::write_read(A, reg(GPIO_TIO_HV_STATUS), vec![0x00]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Vl53l1x::new(i2c.clone());

        assert_eq!(sensor.sample_ready().await, Ok(true));
        i2c.done();
    }

    #[futures_test::test]
    async fn reads_valid_distance() {
        let expectations = [
            Transaction::write_read(A, reg(RESULT_RANGE_STATUS), vec![RANGE_STATUS_VALID]),
            Transaction::write_read(
                A,
                reg(RESULT_FINAL_CROSSTALK_CORRECTED_RANGE_MM_SD0),
                vec![0x04, 0xD2],
            ),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Vl53l1x::new(i2c.clone());

        assert_eq!(sensor.read_distance().await, Ok(1234));
        i2c.done();
    }

    #[futures_test::test]
    async fn invalid_range_status_is_reported() {
        let expectations = [Transaction::write_read(
            A,
            reg(RESULT_RANGE_STATUS),
            vec![0x04],
        )];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Vl53l1x::new(i2c.clone());

        assert_eq!(
            sensor.read_distance().await,
            Err(RangingError::InvalidRange(0x04))
        );
        i2c.done();
    }

    #[futures_test::test]
    async fn clear_latch_writes_interrupt_clear() {
        let expectations = [write(SYSTEM_INTERRUPT_CLEAR, &[0x01])];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Vl53l1x::new(i2c.clone());

        assert_eq!(sensor.clear_latch().await, Ok(()));
        i2c.done();
    }

    #[futures_test::test]
    async fn long_mode_200ms_budget_writes_timeouts() {
        let expectations = [
            write(PHASECAL_CONFIG_TIMEOUT_MACROP, &[0x0A]),
            write(RANGE_CONFIG_VCSEL_PERIOD_A, &[0x0F]),
            write(RANGE_CONFIG_VCSEL_PERIOD_B, &[0x0D]),
            write(RANGE_CONFIG_VALID_PHASE_HIGH, &[0xB8]),
            write(SD_CONFIG_WOI_SD0, &[0x0F, 0x0D]),
            write(SD_CONFIG_INITIAL_PHASE_SD0, &[0x0E, 0x0E]),
            write(RANGE_CONFIG_TIMEOUT_MACROP_A_HI, &[0x02, 0xD9]),
            write(RANGE_CONFIG_TIMEOUT_MACROP_B_HI, &[0x02, 0xF8]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Vl53l1x::new(i2c.clone());

        sensor.set_distance_mode(DistanceMode::Long).await.unwrap();
        sensor.set_timing_budget(200).await.unwrap();
        i2c.done();
    }

    #[futures_test::test]
    async fn unsupported_budget_touches_nothing() {
        let expectations: [Transaction; 0] = [];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Vl53l1x::new(i2c.clone());

        assert_eq!(
            sensor.set_timing_budget(42).await,
            Err(RangingError::UnsupportedTimingBudget(42))
        );
        i2c.done();
    }

    #[futures_test::test]
    async fn wrong_model_id_is_rejected() {
        let expectations = [Transaction::write_read(
            A,
            reg(IDENTIFICATION_MODEL_ID),
            vec![0xEE, 0xAA, 0x10],
        )];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Vl53l1x::new(i2c.clone());

        assert_eq!(sensor.init().await, Err(RangingError::WrongDevice));
        i2c.done();
    }
}
