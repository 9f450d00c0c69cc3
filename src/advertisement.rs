use mac_address::MacAddress;
use std::fmt;

/// `event_type`, `address_type`, six address bytes and the length byte.
pub const RECORD_HEADER_SIZE: usize = 9;

const HCI_EVENT_PKT: u8 = 0x04;
const EVT_LE_META_EVENT: u8 = 0x3E;
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;
/// Packet type, event code, parameter length, subevent, report count.
const LE_REPORT_PREAMBLE: usize = 5;

const AD_FLAGS: u8 = 0x01;
const AD_SERVICE_DATA_UUID16: u8 = 0x16;
const FLAGS_GENERAL_DISCOVERABLE_NO_BREDR: u8 = 0x06;
/// Largest service data whose rebuilt payload still fits a one-byte length.
const MAX_SERVICE_DATA: usize = 248;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    TruncatedRecord { needed: usize, available: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TruncatedRecord { needed, available } => write!(
                f,
                "truncated advertising record: needs {} bytes, {} available",
                needed, available
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// One advertising report as delivered by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingRecord {
    pub event_type: u8,
    pub address_type: u8,
    pub address: MacAddress,
    pub payload: Vec<u8>,
    pub rssi: i8,
}

impl AdvertisingRecord {
    /// Parses a single `le_advertising_info` record.
    ///
    /// The address is transmitted least significant byte first; the payload
    /// length is taken from the record's own length field and the signal
    /// strength byte follows the payload.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        if raw.len() < RECORD_HEADER_SIZE {
            return Err(ParseError::TruncatedRecord {
                needed: RECORD_HEADER_SIZE,
                available: raw.len(),
            });
        }

        let length = raw[8] as usize;
        let needed = RECORD_HEADER_SIZE + length + 1;
        if raw.len() < needed {
            return Err(ParseError::TruncatedRecord {
                needed,
                available: raw.len(),
            });
        }

        let mut address = [0u8; 6];
        for (dst, src) in address.iter_mut().zip(raw[2..8].iter().rev()) {
            *dst = *src;
        }

        Ok(AdvertisingRecord {
            event_type: raw[0],
            address_type: raw[1],
            address: MacAddress::new(address),
            payload: raw[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + length].to_vec(),
            rssi: raw[RECORD_HEADER_SIZE + length] as i8,
        })
    }

    /// Rebuilds the advertising payload around 16-bit UUID service data, for
    /// transports that hand out service data already split from the PDU.
    ///
    /// Returns `None` when `data` does not fit a one-byte AD length.
    pub fn from_service_data(
        address: MacAddress,
        uuid16: u16,
        data: &[u8],
        rssi: i8,
    ) -> Option<Self> {
        if data.len() > MAX_SERVICE_DATA {
            return None;
        }
        let [uuid_lo, uuid_hi] = uuid16.to_le_bytes();
        let mut payload = Vec::with_capacity(7 + data.len());
        payload.extend_from_slice(&[0x02, AD_FLAGS, FLAGS_GENERAL_DISCOVERABLE_NO_BREDR]);
        payload.push((data.len() + 3) as u8);
        payload.extend_from_slice(&[AD_SERVICE_DATA_UUID16, uuid_lo, uuid_hi]);
        payload.extend_from_slice(data);

        Some(AdvertisingRecord {
            event_type: 0,
            address_type: 0,
            address,
            payload,
            rssi,
        })
    }

    /// A record that only says `address` was heard.
    pub fn sighting(address: MacAddress, rssi: i8) -> Self {
        AdvertisingRecord {
            event_type: 0,
            address_type: 0,
            address,
            payload: Vec::new(),
            rssi,
        }
    }

    /// Declared payload length, saturating at 255 for an oversized payload.
    pub fn length(&self) -> u8 {
        u8::try_from(self.payload.len()).unwrap_or(u8::MAX)
    }

    pub fn address_string(&self) -> String {
        self.address.to_string()
    }
}

/// Iterator over the advertising reports carried by one HCI event packet.
pub struct Reports<'a> {
    rest: &'a [u8],
    remaining: u8,
}

/// Splits a raw HCI event packet into advertising records. Anything other
/// than an LE advertising report event yields no records.
pub fn reports(packet: &[u8]) -> Reports<'_> {
    match packet {
        [HCI_EVENT_PKT, EVT_LE_META_EVENT, _, EVT_LE_ADVERTISING_REPORT, count, ..] => Reports {
            rest: &packet[LE_REPORT_PREAMBLE..],
            remaining: *count,
        },
        _ => Reports {
            rest: &[],
            remaining: 0,
        },
    }
}

impl Iterator for Reports<'_> {
    type Item = Result<AdvertisingRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        match AdvertisingRecord::parse(self.rest) {
            Ok(record) => {
                let consumed = RECORD_HEADER_SIZE + record.payload.len() + 1;
                let rest = self.rest;
                self.rest = &rest[consumed..];
                Some(Ok(record))
            }
            Err(err) => {
                // the next record's offset depends on this one's length
                self.remaining = 0;
                Some(Err(err))
            }
        }
    }
}
