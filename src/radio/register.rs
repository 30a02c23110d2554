//! Configuration register codec
//!
//! # Register layout
//!
//! ```text
//! [header][0x00][0x09][addr_hi][addr_lo][net_id][uart|air][buf|pwr|0x20][freq_off][mode|rssi][key_hi][key_lo]
//! ```
//!
//! - `header`: `0xC0` keeps settings across power cycles, `0xC2` does not
//! - `uart|air`: UART baud code in bits 7-5, air data rate code in bits 2-0
//! - `buf|pwr|0x20`: packet size code in bits 7-6, noise RSSI enable in bit 5,
//!   TX power code in bits 1-0
//! - `mode|rssi`: transmission mode flags, packet RSSI enable in bit 7
//!
//! The module answers a successful write with `0xC1`, usually followed by
//! an echo of the remaining eleven bytes. Reading settings (`C1 00 09`)
//! returns the same layout with header `0xC1`.

use crate::config::radio_defaults;
use crate::config::register::{self, offset};
use crate::radio::traits::ChannelError;

/// Errors building or applying a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Frequency (MHz) outside both supported bands
    InvalidFrequency(u16),
    /// Module never acknowledged the register
    NoAck,
    /// Opening or closing the channel failed
    Channel(ChannelError),
}

impl From<ChannelError> for ConfigError {
    fn from(error: ChannelError) -> Self {
        Self::Channel(error)
    }
}

/// Acknowledgement decode errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckError {
    /// No bytes received
    Empty,
    /// First byte was not the success marker
    Mismatch(u8),
}

/// Settings read-back errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    Channel(ChannelError),
    Ack(AckError),
    /// Reply shorter than a full register
    Truncated(usize),
    /// Parameter-count byte was not 0x09
    BadLength(u8),
}

impl From<ChannelError> for SettingsError {
    fn from(error: ChannelError) -> Self {
        Self::Channel(error)
    }
}

/// Supported frequency bands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// 410-493 MHz (E22-400 modules)
    Low,
    /// 850-930 MHz (E22-900 modules)
    High,
}

impl Band {
    /// Band containing `mhz`, if any
    pub fn from_frequency(mhz: u16) -> Option<Self> {
        [Self::Low, Self::High]
            .into_iter()
            .find(|band| (band.start_mhz()..=band.end_mhz()).contains(&mhz))
    }

    pub fn start_mhz(self) -> u16 {
        match self {
            Self::Low => 410,
            Self::High => 850,
        }
    }

    pub fn end_mhz(self) -> u16 {
        match self {
            Self::Low => 493,
            Self::High => 930,
        }
    }

    /// Frequency for a register offset within this band
    pub fn frequency_for(self, offset: u8) -> u16 {
        self.start_mhz() + u16::from(offset)
    }
}

/// Transmission mode flags in register byte 9
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionMode {
    /// Addressed point-to-point transmission
    FixedPoint,
    /// Repeater that forwards other nodes' packets
    Relay,
}

impl TransmissionMode {
    fn flags(self) -> u8 {
        match self {
            Self::FixedPoint => register::MODE_FIXED_POINT,
            Self::Relay => register::MODE_RELAY,
        }
    }

    fn from_flags(flags: u8) -> Option<Self> {
        match flags & !register::PACKET_RSSI_ENABLE {
            register::MODE_FIXED_POINT => Some(Self::FixedPoint),
            register::MODE_RELAY => Some(Self::Relay),
            _ => None,
        }
    }
}

/// (value, code) lookup tables
const UART_BAUD_CODES: [(u32, u8); 8] = [
    (1200, 0x00),
    (2400, 0x20),
    (4800, 0x40),
    (9600, 0x60),
    (19_200, 0x80),
    (38_400, 0xA0),
    (57_600, 0xC0),
    (115_200, 0xE0),
];
const UART_BAUD_MASK: u8 = 0xE0;

const AIR_SPEED_CODES: [(u32, u8); 7] = [
    (1200, 0x01),
    (2400, 0x02),
    (4800, 0x03),
    (9600, 0x04),
    (19_200, 0x05),
    (38_400, 0x06),
    (62_500, 0x07),
];
const AIR_SPEED_MASK: u8 = 0x07;

const POWER_CODES: [(u32, u8); 4] = [(22, 0x00), (17, 0x01), (13, 0x02), (10, 0x03)];
const POWER_MASK: u8 = 0x03;

const BUFFER_SIZE_CODES: [(u32, u8); 4] = [(240, 0x00), (128, 0x40), (64, 0x80), (32, 0xC0)];
const BUFFER_SIZE_MASK: u8 = 0xC0;

/// Entry nearest to `value`; ties go to the lower value
fn nearest(table: &[(u32, u8)], value: u32) -> (u32, u8) {
    let mut best = table[0];
    for &entry in &table[1..] {
        let distance = entry.0.abs_diff(value);
        let best_distance = best.0.abs_diff(value);
        if distance < best_distance || (distance == best_distance && entry.0 < best.0) {
            best = entry;
        }
    }
    best
}

fn value_for(table: &[(u32, u8)], code: u8) -> Option<u32> {
    table.iter().find(|entry| entry.1 == code).map(|entry| entry.0)
}

/// Supported UART baud rate nearest to `baud`
pub fn supported_uart_baud(baud: u32) -> u32 {
    nearest(&UART_BAUD_CODES, baud).0
}

/// Supported air data rate nearest to `bps`
pub fn supported_air_speed(bps: u16) -> u16 {
    nearest(&AIR_SPEED_CODES, u32::from(bps)).0 as u16
}

/// Supported TX power nearest to `dbm`
pub fn supported_tx_power(dbm: u8) -> u8 {
    nearest(&POWER_CODES, u32::from(dbm)).0 as u8
}

/// Supported packet size nearest to `bytes`
pub fn supported_buffer_size(bytes: u8) -> u8 {
    nearest(&BUFFER_SIZE_CODES, u32::from(bytes)).0 as u8
}

/// Radio configuration
///
/// Frequency is validated on construction; every other field accepts any
/// value and is mapped to the nearest supported setting when encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioConfig {
    address: u16,
    network_id: u8,
    frequency_mhz: u16,
    band: Band,
    tx_power_dbm: u8,
    air_speed_bps: u16,
    buffer_size: u8,
    crypt_key: u16,
    rssi_enabled: bool,
    persistent: bool,
    transmission: TransmissionMode,
}

impl RadioConfig {
    /// Configuration for `address` on `frequency_mhz`, other fields default
    pub fn new(address: u16, frequency_mhz: u16) -> Result<Self, ConfigError> {
        let band =
            Band::from_frequency(frequency_mhz).ok_or(ConfigError::InvalidFrequency(frequency_mhz))?;
        Ok(Self {
            address,
            frequency_mhz,
            band,
            ..Self::default()
        })
    }

    pub fn with_network_id(mut self, network_id: u8) -> Self {
        self.network_id = network_id;
        self
    }

    pub fn with_tx_power(mut self, dbm: u8) -> Self {
        self.tx_power_dbm = dbm;
        self
    }

    pub fn with_air_speed(mut self, bps: u16) -> Self {
        self.air_speed_bps = bps;
        self
    }

    pub fn with_buffer_size(mut self, bytes: u8) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Zero disables encryption
    pub fn with_crypt_key(mut self, key: u16) -> Self {
        self.crypt_key = key;
        self
    }

    /// Append a packet RSSI byte to every received frame
    pub fn with_rssi(mut self, enabled: bool) -> Self {
        self.rssi_enabled = enabled;
        self
    }

    /// Keep settings across power cycles
    pub fn with_persistence(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_transmission(mut self, mode: TransmissionMode) -> Self {
        self.transmission = mode;
        self
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn network_id(&self) -> u8 {
        self.network_id
    }

    pub fn frequency_mhz(&self) -> u16 {
        self.frequency_mhz
    }

    pub fn band(&self) -> Band {
        self.band
    }

    /// Offset of the frequency from the start of its band
    pub fn frequency_offset(&self) -> u8 {
        (self.frequency_mhz - self.band.start_mhz()) as u8
    }

    pub fn tx_power_dbm(&self) -> u8 {
        self.tx_power_dbm
    }

    pub fn air_speed_bps(&self) -> u16 {
        self.air_speed_bps
    }

    pub fn buffer_size(&self) -> u8 {
        self.buffer_size
    }

    pub fn crypt_key(&self) -> u16 {
        self.crypt_key
    }

    pub fn rssi_enabled(&self) -> bool {
        self.rssi_enabled
    }

    pub fn persistent(&self) -> bool {
        self.persistent
    }

    pub fn transmission(&self) -> TransmissionMode {
        self.transmission
    }

    /// This configuration with every enumerated field at the value the
    /// module will actually use
    pub fn normalized(&self) -> Self {
        Self {
            tx_power_dbm: supported_tx_power(self.tx_power_dbm),
            air_speed_bps: supported_air_speed(self.air_speed_bps),
            buffer_size: supported_buffer_size(self.buffer_size),
            ..self.clone()
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            address: radio_defaults::ADDRESS,
            network_id: radio_defaults::NETWORK_ID,
            // 868 MHz
            frequency_mhz: radio_defaults::FREQUENCY_MHZ,
            band: Band::High,
            tx_power_dbm: radio_defaults::TX_POWER_DBM,
            air_speed_bps: radio_defaults::AIR_SPEED_BPS,
            buffer_size: radio_defaults::BUFFER_SIZE,
            crypt_key: radio_defaults::CRYPT_KEY,
            rssi_enabled: true,
            persistent: false,
            transmission: TransmissionMode::FixedPoint,
        }
    }
}

/// Encode `config` into the 12-byte register
///
/// `uart_baud` is the baud rate the module switches to afterwards.
pub fn encode(config: &RadioConfig, uart_baud: u32) -> [u8; register::LENGTH] {
    let mut reg = [0u8; register::LENGTH];

    reg[offset::HEADER] = if config.persistent {
        register::HEADER_PERSISTENT
    } else {
        register::HEADER_VOLATILE
    };
    reg[offset::COUNT_HI] = register::PARAM_COUNT[0];
    reg[offset::COUNT_LO] = register::PARAM_COUNT[1];

    let [addr_hi, addr_lo] = config.address.to_be_bytes();
    reg[offset::ADDR_HI] = addr_hi;
    reg[offset::ADDR_LO] = addr_lo;
    reg[offset::NET_ID] = config.network_id;

    reg[offset::UART_AIR] = nearest(&UART_BAUD_CODES, uart_baud).1
        | nearest(&AIR_SPEED_CODES, u32::from(config.air_speed_bps)).1;
    reg[offset::BUFFER_POWER] = nearest(&BUFFER_SIZE_CODES, u32::from(config.buffer_size)).1
        | nearest(&POWER_CODES, u32::from(config.tx_power_dbm)).1
        | register::NOISE_RSSI_ENABLE;
    reg[offset::FREQ_OFFSET] = config.frequency_offset();

    let rssi_bit = if config.rssi_enabled {
        register::PACKET_RSSI_ENABLE
    } else {
        0x00
    };
    reg[offset::MODE_RSSI] = config.transmission.flags() | rssi_bit;

    let [key_hi, key_lo] = config.crypt_key.to_be_bytes();
    reg[offset::CRYPT_HI] = key_hi;
    reg[offset::CRYPT_LO] = key_lo;

    reg
}

/// Check the module's reply to a register write
pub fn decode_ack(resp: &[u8]) -> Result<(), AckError> {
    match resp.first() {
        None => Err(AckError::Empty),
        Some(&register::ACK) => Ok(()),
        Some(&other) => Err(AckError::Mismatch(other)),
    }
}

/// Settings decoded from a register image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioSettings {
    pub header: u8,
    pub address: u16,
    pub network_id: u8,
    /// `None` for codes outside the table
    pub uart_baud: Option<u32>,
    pub air_speed_bps: Option<u16>,
    pub buffer_size: u8,
    pub tx_power_dbm: u8,
    pub frequency_offset: u8,
    pub transmission: Option<TransmissionMode>,
    pub rssi_enabled: bool,
    pub noise_rssi_enabled: bool,
    pub crypt_key: u16,
}

impl RadioSettings {
    /// Frequency in MHz, given the band the module is built for
    pub fn frequency_mhz(&self, band: Band) -> u16 {
        band.frequency_for(self.frequency_offset)
    }

    /// True when every parameter except the header matches
    pub fn same_parameters(&self, other: &RadioSettings) -> bool {
        Self { header: 0, ..*self } == Self { header: 0, ..*other }
    }
}

/// Decode a 12-byte register image
pub fn decode_register(reg: &[u8; register::LENGTH]) -> RadioSettings {
    let uart_air = reg[offset::UART_AIR];
    let buffer_power = reg[offset::BUFFER_POWER];
    let mode_rssi = reg[offset::MODE_RSSI];

    // Both two-bit fields cover their whole table
    let buffer_size = value_for(&BUFFER_SIZE_CODES, buffer_power & BUFFER_SIZE_MASK)
        .unwrap_or(u32::from(radio_defaults::BUFFER_SIZE)) as u8;
    let tx_power_dbm = value_for(&POWER_CODES, buffer_power & POWER_MASK)
        .unwrap_or(u32::from(radio_defaults::TX_POWER_DBM)) as u8;

    RadioSettings {
        header: reg[offset::HEADER],
        address: u16::from_be_bytes([reg[offset::ADDR_HI], reg[offset::ADDR_LO]]),
        network_id: reg[offset::NET_ID],
        uart_baud: value_for(&UART_BAUD_CODES, uart_air & UART_BAUD_MASK),
        air_speed_bps: value_for(&AIR_SPEED_CODES, uart_air & AIR_SPEED_MASK).map(|bps| bps as u16),
        buffer_size,
        tx_power_dbm,
        frequency_offset: reg[offset::FREQ_OFFSET],
        transmission: TransmissionMode::from_flags(mode_rssi),
        rssi_enabled: mode_rssi & register::PACKET_RSSI_ENABLE != 0,
        noise_rssi_enabled: buffer_power & register::NOISE_RSSI_ENABLE != 0,
        crypt_key: u16::from_be_bytes([reg[offset::CRYPT_HI], reg[offset::CRYPT_LO]]),
    }
}

/// Decode a settings reply (`C1 00 09 ...`)
pub fn decode_settings(resp: &[u8]) -> Result<RadioSettings, SettingsError> {
    decode_ack(resp).map_err(SettingsError::Ack)?;

    let Some(reg) = resp.get(..register::LENGTH) else {
        return Err(SettingsError::Truncated(resp.len()));
    };
    if reg[offset::COUNT_LO] != register::PARAM_COUNT[1] {
        return Err(SettingsError::BadLength(reg[offset::COUNT_LO]));
    }

    let mut image = [0u8; register::LENGTH];
    image.copy_from_slice(reg);
    Ok(decode_register(&image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::proptest;

    #[test]
    fn test_band_offsets() {
        let cfg = RadioConfig::new(1, 868).unwrap();
        assert_eq!(cfg.band(), Band::High);
        assert_eq!(cfg.frequency_offset(), 18);

        let cfg = RadioConfig::new(1, 430).unwrap();
        assert_eq!(cfg.band(), Band::Low);
        assert_eq!(cfg.frequency_offset(), 20);
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(Band::from_frequency(410), Some(Band::Low));
        assert_eq!(Band::from_frequency(493), Some(Band::Low));
        assert_eq!(Band::from_frequency(850), Some(Band::High));
        assert_eq!(Band::from_frequency(930), Some(Band::High));
        assert_eq!(Band::from_frequency(409), None);
        assert_eq!(Band::from_frequency(494), None);
        assert_eq!(Band::from_frequency(931), None);
    }

    #[test]
    fn test_out_of_band_rejected() {
        assert_eq!(
            RadioConfig::new(1, 500),
            Err(ConfigError::InvalidFrequency(500))
        );
        assert_eq!(RadioConfig::new(1, 0), Err(ConfigError::InvalidFrequency(0)));
    }

    #[test]
    fn test_default_is_consistent() {
        let cfg = RadioConfig::default();
        assert_eq!(Band::from_frequency(cfg.frequency_mhz()), Some(cfg.band()));
        assert_eq!(cfg.frequency_offset(), 18);
    }

    #[test]
    fn test_encode_layout() {
        let cfg = RadioConfig::new(0x1234, 868)
            .unwrap()
            .with_network_id(7)
            .with_air_speed(2400)
            .with_tx_power(22)
            .with_buffer_size(240)
            .with_crypt_key(0xBEEF)
            .with_rssi(true);

        let reg = encode(&cfg, 115_200);
        assert_eq!(
            reg,
            [0xC2, 0x00, 0x09, 0x12, 0x34, 0x07, 0xE2, 0x20, 0x12, 0xC3, 0xBE, 0xEF]
        );
    }

    #[test]
    fn test_encode_matches_hat_template() {
        // Stock LoRa HAT template at 9600 baud: C2 00 09 00 00 00 62 00 12 43 00 00
        let cfg = RadioConfig::new(0, 868).unwrap().with_rssi(false);
        let reg = encode(&cfg, 9600);
        assert_eq!(reg[6], 0x62);
        assert_eq!(reg[8], 0x12);
        assert_eq!(reg[9], 0x43);
    }

    #[test]
    fn test_encode_flags() {
        let cfg = RadioConfig::new(1, 433)
            .unwrap()
            .with_persistence(true)
            .with_rssi(false)
            .with_transmission(TransmissionMode::Relay)
            .with_tx_power(10)
            .with_buffer_size(32);

        let reg = encode(&cfg, 9600);
        assert_eq!(reg[0], register::HEADER_PERSISTENT);
        assert_eq!(reg[7], 0xC0 | 0x03 | 0x20);
        assert_eq!(reg[8], 23);
        assert_eq!(reg[9], 0x03);
    }

    #[test]
    fn test_unmapped_values_use_nearest() {
        assert_eq!(supported_air_speed(2500), 2400);
        assert_eq!(supported_air_speed(50_000), 38_400);
        assert_eq!(supported_air_speed(60_000), 62_500);
        assert_eq!(supported_air_speed(0), 1200);
        assert_eq!(supported_tx_power(20), 22);
        assert_eq!(supported_tx_power(15), 13);
        assert_eq!(supported_tx_power(0), 10);
        assert_eq!(supported_buffer_size(200), 240);
        assert_eq!(supported_buffer_size(48), 32);
        assert_eq!(supported_uart_baud(100_000), 115_200);
        assert_eq!(supported_uart_baud(9000), 9600);

        let cfg = RadioConfig::new(1, 868).unwrap().with_air_speed(3000);
        assert_eq!(encode(&cfg, 9600)[6] & 0x07, 0x02);
    }

    #[test]
    fn test_normalized_config() {
        let cfg = RadioConfig::default();
        assert_eq!(cfg.normalized(), cfg);

        let odd = RadioConfig::new(9, 868)
            .unwrap()
            .with_air_speed(50_000)
            .with_tx_power(20)
            .with_buffer_size(100);
        let normalized = odd.normalized();
        assert_eq!(normalized.air_speed_bps(), 38_400);
        assert_eq!(normalized.tx_power_dbm(), 22);
        assert_eq!(normalized.buffer_size(), 128);
        assert_eq!(normalized.address(), 9);
        // Same register either way
        assert_eq!(encode(&odd, 9600), encode(&normalized, 9600));
    }

    #[test]
    fn test_decode_register_recovers_fields() {
        for (address, network_id, frequency) in
            [(0u16, 0u8, 850u16), (1000, 3, 868), (0xFFFF, 255, 930), (42, 9, 410), (7, 1, 493)]
        {
            let cfg = RadioConfig::new(address, frequency)
                .unwrap()
                .with_network_id(network_id);
            let settings = decode_register(&encode(&cfg, 115_200));

            assert_eq!(settings.address, address);
            assert_eq!(settings.network_id, network_id);
            assert_eq!(settings.frequency_offset, cfg.frequency_offset());
            assert_eq!(settings.frequency_mhz(cfg.band()), frequency);
        }
    }

    #[test]
    fn test_decode_register_lookups() {
        let cfg = RadioConfig::new(5, 915)
            .unwrap()
            .with_air_speed(19_200)
            .with_tx_power(17)
            .with_buffer_size(64)
            .with_crypt_key(0x0102)
            .with_rssi(true);
        let settings = decode_register(&encode(&cfg, 57_600));

        assert_eq!(settings.uart_baud, Some(57_600));
        assert_eq!(settings.air_speed_bps, Some(19_200));
        assert_eq!(settings.tx_power_dbm, 17);
        assert_eq!(settings.buffer_size, 64);
        assert_eq!(settings.crypt_key, 0x0102);
        assert_eq!(settings.transmission, Some(TransmissionMode::FixedPoint));
        assert!(settings.rssi_enabled);
        assert!(settings.noise_rssi_enabled);
    }

    #[test]
    fn test_decode_ack() {
        assert_eq!(decode_ack(&[0xC1]), Ok(()));
        assert_eq!(decode_ack(&[0xC1, 0x00, 0x09]), Ok(()));
        assert_eq!(decode_ack(&[]), Err(AckError::Empty));
        assert_eq!(decode_ack(&[0xFF, 0xC1]), Err(AckError::Mismatch(0xFF)));
    }

    #[test]
    fn test_decode_settings_validation() {
        let mut reply = encode(&RadioConfig::default(), 115_200);
        reply[0] = register::ACK;

        assert!(decode_settings(&reply).is_ok());
        assert_eq!(decode_settings(&reply[..9]), Err(SettingsError::Truncated(9)));
        assert_eq!(decode_settings(&[]), Err(SettingsError::Ack(AckError::Empty)));

        let mut bad = reply;
        bad[2] = 0x07;
        assert_eq!(decode_settings(&bad), Err(SettingsError::BadLength(0x07)));

        bad[0] = 0xC2;
        assert_eq!(
            decode_settings(&bad),
            Err(SettingsError::Ack(AckError::Mismatch(0xC2)))
        );
    }

    #[test]
    fn test_same_parameters_ignores_header() {
        let reg = encode(&RadioConfig::default(), 115_200);
        let mut echo = reg;
        echo[0] = register::ACK;

        let sent = decode_register(&reg);
        assert!(sent.same_parameters(&decode_register(&echo)));

        echo[4] ^= 0x01;
        assert!(!sent.same_parameters(&decode_register(&echo)));
    }

    fn in_band_frequency() -> impl Strategy<Value = u16> {
        prop_oneof![410u16..=493, 850u16..=930]
    }

    proptest! {
        #[test]
        fn prop_register_recovers_identity(
            address in any::<u16>(),
            network_id in any::<u8>(),
            frequency in in_band_frequency(),
        ) {
            let cfg = RadioConfig::new(address, frequency)
                .unwrap()
                .with_network_id(network_id);
            let settings = decode_register(&encode(&cfg, 115_200));

            prop_assert_eq!(settings.address, address);
            prop_assert_eq!(settings.network_id, network_id);
            prop_assert_eq!(settings.frequency_offset, cfg.frequency_offset());
            prop_assert_eq!(settings.frequency_mhz(cfg.band()), frequency);
        }

        #[test]
        fn prop_decode_settings_total(resp in proptest::collection::vec(any::<u8>(), 0..32)) {
            if decode_settings(&resp).is_ok() {
                prop_assert!(resp.len() >= register::LENGTH);
                prop_assert_eq!(resp[0], register::ACK);
            }
        }
    }
}
