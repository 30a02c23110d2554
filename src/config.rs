//! Configuration constants for UART SX126x modules (E22 / Waveshare LoRa HAT)

/// UART settings
pub mod uart {
    /// The module only accepts register writes at 9600 baud
    pub const CONFIG_BAUD: u32 = 9600;
    /// Baud rate programmed into the register and used afterwards
    pub const OPERATING_BAUD: u32 = 115_200;
    /// Read timeout for configuration replies
    pub const READ_TIMEOUT_MS: u32 = 2000;
}

/// Delays, all in milliseconds
pub mod timing {
    /// Settle time after changing M0/M1
    pub const MODE_SETTLE_MS: u32 = 100;
    /// Wait after writing the register before reading the ack
    pub const CONFIG_WRITE_MS: u32 = 300;
    /// Wait between failed configuration attempts
    pub const CONFIG_RETRY_MS: u32 = 500;
    /// Wait after closing the UART before reopening it
    pub const UART_CLOSE_MS: u32 = 300;
    /// Wait in configuration mode before reopening at the operating baud
    pub const UART_INIT_MS: u32 = 500;
    /// Wait after reopening before leaving configuration mode
    pub const UART_STABILIZE_MS: u32 = 30;
    /// Wait after writing a packet
    pub const TX_SETTLE_MS: u32 = 150;
    /// Wait for an in-flight frame to finish arriving
    pub const RX_SETTLE_MS: u32 = 150;
    /// Interval between polls in bounded receives
    pub const RX_POLL_MS: u32 = 10;
    /// Wait for the module to measure channel noise
    pub const NOISE_RSSI_MS: u32 = 500;
    /// Wait for the settings read-back reply
    pub const SETTINGS_READ_MS: u32 = 200;
}

/// Configuration register layout and command bytes
pub mod register {
    /// Register length in bytes
    pub const LENGTH: usize = 12;

    /// Header for settings kept across power cycles
    pub const HEADER_PERSISTENT: u8 = 0xC0;
    /// Header for settings lost on power off
    pub const HEADER_VOLATILE: u8 = 0xC2;
    /// Reply header on success
    pub const ACK: u8 = 0xC1;

    /// Parameter-count field (bytes 1-2)
    pub const PARAM_COUNT: [u8; 2] = [0x00, 0x09];

    /// Noise RSSI enable flag in byte 7
    pub const NOISE_RSSI_ENABLE: u8 = 0x20;
    /// Packet RSSI enable bit in byte 9
    pub const PACKET_RSSI_ENABLE: u8 = 0x80;
    /// Transmission mode flags in byte 9
    pub const MODE_FIXED_POINT: u8 = 0x43;
    pub const MODE_RELAY: u8 = 0x03;

    /// Read-settings command
    pub const READ_SETTINGS: [u8; 3] = [0xC1, 0x00, 0x09];

    /// Channel noise RSSI command and reply prefix
    pub const NOISE_RSSI_CMD: [u8; 6] = [0xC0, 0xC1, 0xC2, 0xC3, 0x00, 0x02];
    pub const NOISE_RSSI_REPLY: [u8; 3] = [0xC1, 0x00, 0x02];

    /// Register byte offsets
    pub mod offset {
        pub const HEADER: usize = 0;
        pub const COUNT_HI: usize = 1;
        pub const COUNT_LO: usize = 2;
        pub const ADDR_HI: usize = 3;
        pub const ADDR_LO: usize = 4;
        pub const NET_ID: usize = 5;
        pub const UART_AIR: usize = 6;
        pub const BUFFER_POWER: usize = 7;
        pub const FREQ_OFFSET: usize = 8;
        pub const MODE_RSSI: usize = 9;
        pub const CRYPT_HI: usize = 10;
        pub const CRYPT_LO: usize = 11;
    }
}

/// Link protocol constants
pub mod protocol {
    /// Frame terminator appended to every packet
    pub const FRAME_TERMINATOR: u8 = 0x0A;

    /// Addressing header written by the sender
    pub const TX_HEADER_LEN: usize = 6;

    /// Header left on the frame after the radio strips the sender fields
    pub const RX_HEADER_LEN: usize = 3;

    /// Maximum application payload per packet
    pub const MAX_PAYLOAD: usize = 240;

    /// Maximum encoded packet: header + payload + terminator
    pub const MAX_PACKET_LEN: usize = TX_HEADER_LEN + MAX_PAYLOAD + 1;

    /// Bytes read from the UART per receive poll
    pub const RX_CHUNK_SIZE: usize = 256;

    /// Reassembly buffer for partially received frames
    pub const RX_BUFFER_SIZE: usize = 512;

    /// Address every node accepts
    pub const BROADCAST_ADDRESS: u16 = 0xFFFF;
}

/// Default radio configuration
pub mod radio_defaults {
    /// EU ISM band
    pub const FREQUENCY_MHZ: u16 = 868;
    pub const ADDRESS: u16 = 0;
    pub const NETWORK_ID: u8 = 0;
    pub const TX_POWER_DBM: u8 = 22;
    pub const AIR_SPEED_BPS: u16 = 2400;
    pub const BUFFER_SIZE: u8 = 240;
    /// Zero disables encryption
    pub const CRYPT_KEY: u16 = 0;
}

/// Configuration attempts before giving up
pub const MAX_CONFIG_ATTEMPTS: u8 = 3;
