//! Checksum algorithms applied over message byte windows.

lazy_static! {
    static ref CRC8_TABLE: [u8; 256] = {
        let mut table = [0u8; 256];
        for (value, slot) in table.iter_mut().enumerate() {
            let mut crc = value as u8;
            for _ in 0..8 {
                crc = if crc & 0x80 != 0 {
                    (crc << 1) ^ 0x07
                } else {
                    crc << 1
                };
            }
            *slot = crc;
        }
        table
    };
    static ref CRC16_CCITT_TABLE: [u16; 256] = {
        let mut table = [0u16; 256];
        for (value, slot) in table.iter_mut().enumerate() {
            let mut crc = (value as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ 0x1021
                } else {
                    crc << 1
                };
            }
            *slot = crc;
        }
        table
    };
    static ref CRC16_IBM_TABLE: [u16; 256] = {
        let mut table = [0u16; 256];
        for (value, slot) in table.iter_mut().enumerate() {
            let mut crc = value as u16;
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
            }
            *slot = crc;
        }
        table
    };
    static ref CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        for (value, slot) in table.iter_mut().enumerate() {
            let mut crc = value as u32;
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
            }
            *slot = crc;
        }
        table
    };
}

/// A checksum algorithm a template may declare over its window.
///
/// `start_value` is the initial register value declared by the template.
/// CRC-32 additionally applies its conventional final complement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// CRC-8, polynomial 0x07, unreflected.
    Crc8,
    /// CRC-16/CCITT, polynomial 0x1021, unreflected. With a start value
    /// of 0xFFFF this is CCITT-FALSE; with zero it is XModem.
    Crc16Ccitt,
    /// CRC-16/IBM (ARC), reflected polynomial 0xA001.
    Crc16Ibm,
    /// CRC-32 (ISO-HDLC), reflected polynomial 0xEDB88320.
    Crc32,
}

impl ChecksumAlgorithm {
    /// Width of the transmitted checksum field, in bits.
    pub fn width_bits(self) -> u32 {
        match self {
            ChecksumAlgorithm::Crc8 => 8,
            ChecksumAlgorithm::Crc16Ccitt | ChecksumAlgorithm::Crc16Ibm => 16,
            ChecksumAlgorithm::Crc32 => 32,
        }
    }

    /// Conventional name, used by the describer.
    pub fn name(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc8 => "CRC-8",
            ChecksumAlgorithm::Crc16Ccitt => "CRC-16/CCITT",
            ChecksumAlgorithm::Crc16Ibm => "CRC-16/IBM",
            ChecksumAlgorithm::Crc32 => "CRC-32",
        }
    }

    /// Run the algorithm over a byte window.
    pub fn compute(self, bytes: &[u8], start_value: u64) -> u64 {
        match self {
            ChecksumAlgorithm::Crc8 => {
                let mut crc = start_value as u8;
                for byte in bytes {
                    crc = CRC8_TABLE[(crc ^ byte) as usize];
                }
                crc as u64
            }
            ChecksumAlgorithm::Crc16Ccitt => {
                let mut crc = start_value as u16;
                for byte in bytes {
                    let index = ((crc >> 8) as u8 ^ byte) as usize;
                    crc = (crc << 8) ^ CRC16_CCITT_TABLE[index];
                }
                crc as u64
            }
            ChecksumAlgorithm::Crc16Ibm => {
                let mut crc = start_value as u16;
                for byte in bytes {
                    let index = ((crc as u8) ^ byte) as usize;
                    crc = (crc >> 8) ^ CRC16_IBM_TABLE[index];
                }
                crc as u64
            }
            ChecksumAlgorithm::Crc32 => {
                let mut crc = start_value as u32;
                for byte in bytes {
                    let index = ((crc as u8) ^ byte) as usize;
                    crc = (crc >> 8) ^ CRC32_TABLE[index];
                }
                (crc ^ 0xFFFF_FFFF) as u64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ChecksumAlgorithm;

    const CHECK: &[u8] = b"123456789";

    #[test]
    fn crc8_check_value() {
        assert_eq!(0xF4, ChecksumAlgorithm::Crc8.compute(CHECK, 0));
    }

    #[test]
    fn crc16_ccitt_false_check_value() {
        assert_eq!(0x29B1, ChecksumAlgorithm::Crc16Ccitt.compute(CHECK, 0xFFFF));
    }

    #[test]
    fn crc16_xmodem_check_value() {
        assert_eq!(0x31C3, ChecksumAlgorithm::Crc16Ccitt.compute(CHECK, 0));
    }

    #[test]
    fn crc16_ibm_check_value() {
        assert_eq!(0xBB3D, ChecksumAlgorithm::Crc16Ibm.compute(CHECK, 0));
    }

    #[test]
    fn crc32_check_value() {
        assert_eq!(
            0xCBF4_3926,
            ChecksumAlgorithm::Crc32.compute(CHECK, 0xFFFF_FFFF)
        );
    }

    #[test]
    fn tampering_changes_the_value() {
        let clean = ChecksumAlgorithm::Crc16Ccitt.compute(&[0x03, 0x01, 0x02, 0x03], 0xFFFF);
        let tampered = ChecksumAlgorithm::Crc16Ccitt.compute(&[0x03, 0x01, 0x02, 0x07], 0xFFFF);
        assert_ne!(clean, tampered);
    }
}
