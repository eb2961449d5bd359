//! Station identifiers: callsigns, their CRC-24 tags, and grid locators.
//!
//! Every frame addresses stations by a 3-byte CRC-24 over the canonical
//! callsign form rather than the callsign itself. The canonical form is
//! the base call with any `-N` SSID stripped, upper-cased, right-padded
//! with zeros to 6 bytes. Because the SSID never enters the CRC, a frame
//! tagged for `XX0XXX` matches `XX0XXX-7` and every other SSID of the
//! same base call.

use crc::{Crc, CRC_24_OPENPGP, CRC_32_ISO_HDLC};

/// CRC-24 engine used for callsign tags.
const CRC24: Crc<u32> = Crc::<u32>::new(&CRC_24_OPENPGP);

/// CRC-32 engine used for transfer payload checksums.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Number of bytes in the canonical callsign form.
pub const CALLSIGN_LEN: usize = 6;

/// Errors from parsing station identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallsignError {
    /// Callsign is empty or longer than the canonical form allows.
    BadLength(usize),
    /// Callsign contains a character outside `[A-Z0-9/]`.
    BadCharacter(char),
    /// SSID suffix is not a number in `0..=255`.
    BadSsid(String),
    /// Grid locator is not a 4- or 6-character Maidenhead square.
    BadGrid(String),
}

impl std::fmt::Display for CallsignError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadLength(len) => write!(f, "callsign length {len} out of range 1..=6"),
            Self::BadCharacter(c) => write!(f, "invalid callsign character {c:?}"),
            Self::BadSsid(s) => write!(f, "invalid SSID suffix {s:?}"),
            Self::BadGrid(g) => write!(f, "invalid grid locator {g:?}"),
        }
    }
}

impl std::error::Error for CallsignError {}

/// An amateur radio station identifier with optional numeric SSID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Callsign {
    base: String,
    ssid: Option<u8>,
}

impl Callsign {
    /// Parse a callsign such as `XX0XXX` or `XX0XXX-7`.
    pub fn parse(s: &str) -> Result<Self, CallsignError> {
        let (base, ssid) = match s.split_once('-') {
            Some((base, ssid)) => {
                let ssid = ssid
                    .parse::<u8>()
                    .map_err(|_| CallsignError::BadSsid(ssid.to_string()))?;
                (base, Some(ssid))
            }
            None => (s, None),
        };

        let base = base.to_ascii_uppercase();
        if base.is_empty() || base.len() > CALLSIGN_LEN {
            return Err(CallsignError::BadLength(base.len()));
        }
        if let Some(c) = base
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '/')
        {
            return Err(CallsignError::BadCharacter(c));
        }

        Ok(Self { base, ssid })
    }

    /// The base call without SSID.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The numeric SSID, if any.
    pub fn ssid(&self) -> Option<u8> {
        self.ssid
    }

    /// Canonical 6-byte wire form: base call, zero-padded.
    pub fn to_bytes(&self) -> [u8; CALLSIGN_LEN] {
        let mut out = [0u8; CALLSIGN_LEN];
        out[..self.base.len()].copy_from_slice(self.base.as_bytes());
        out
    }

    /// Decode the canonical 6-byte wire form, dropping the zero padding.
    ///
    /// Bytes that do not form a valid callsign (all padding, stray
    /// control bytes) yield an error rather than a garbage station.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CallsignError> {
        let trimmed: Vec<u8> = bytes
            .iter()
            .copied()
            .take(CALLSIGN_LEN)
            .take_while(|b| *b != 0)
            .collect();
        let s = String::from_utf8(trimmed).map_err(|_| CallsignError::BadLength(0))?;
        Self::parse(&s)
    }

    /// The 3-byte CRC-24 tag of this station's canonical form.
    pub fn crc(&self) -> [u8; 3] {
        callsign_crc(&self.to_bytes())
    }

    /// Check whether `crc` addresses this station, under any SSID.
    ///
    /// Returns `(valid, effective_callsign)` where the effective callsign
    /// is the local base call that matched.
    pub fn matches_crc(&self, crc: &[u8]) -> (bool, Callsign) {
        let effective = Callsign {
            base: self.base.clone(),
            ssid: self.ssid,
        };
        (crc == self.crc(), effective)
    }
}

impl std::fmt::Display for Callsign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ssid {
            Some(ssid) => write!(f, "{}-{}", self.base, ssid),
            None => write!(f, "{}", self.base),
        }
    }
}

impl std::str::FromStr for Callsign {
    type Err = CallsignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// CRC-24 over a canonical callsign byte form.
pub fn callsign_crc(canonical: &[u8; CALLSIGN_LEN]) -> [u8; 3] {
    let crc = CRC24.checksum(canonical);
    let b = crc.to_be_bytes();
    [b[1], b[2], b[3]]
}

/// CRC-32 over a transfer payload, in wire (big-endian) byte order.
pub fn payload_crc32(data: &[u8]) -> [u8; 4] {
    CRC32.checksum(data).to_be_bytes()
}

// ============================================================================
// Maidenhead grid locators
// ============================================================================

/// Sentinel for an absent subsquare pair in the packed grid form.
const GRID_NO_SUBSQUARE: u32 = 0x1f;

/// Pack a 4- or 6-character Maidenhead locator into 4 bytes.
///
/// Layout (26 bits, big-endian u32): field pair 9 bits, square digits
/// 7 bits, subsquare letters 5 bits each. A 4-character locator stores
/// the sentinel value in both subsquare slots.
pub fn encode_grid(grid: &str) -> Result<[u8; 4], CallsignError> {
    let g = grid.to_ascii_uppercase();
    let chars: Vec<char> = g.chars().collect();
    if chars.len() != 4 && chars.len() != 6 {
        return Err(CallsignError::BadGrid(grid.to_string()));
    }

    let field = |c: char| -> Result<u32, CallsignError> {
        if ('A'..='R').contains(&c) {
            Ok(c as u32 - 'A' as u32)
        } else {
            Err(CallsignError::BadGrid(grid.to_string()))
        }
    };
    let digit = |c: char| -> Result<u32, CallsignError> {
        c.to_digit(10).ok_or_else(|| CallsignError::BadGrid(grid.to_string()))
    };
    let subsquare = |c: char| -> Result<u32, CallsignError> {
        if ('A'..='X').contains(&c) {
            Ok(c as u32 - 'A' as u32)
        } else {
            Err(CallsignError::BadGrid(grid.to_string()))
        }
    };

    let pair = field(chars[0])? * 18 + field(chars[1])?;
    let digits = digit(chars[2])? * 10 + digit(chars[3])?;
    let (sub1, sub2) = if chars.len() == 6 {
        (subsquare(chars[4])?, subsquare(chars[5])?)
    } else {
        (GRID_NO_SUBSQUARE, GRID_NO_SUBSQUARE)
    };

    let packed: u32 = (pair << 17) | (digits << 10) | (sub1 << 5) | sub2;
    Ok(packed.to_be_bytes())
}

/// Unpack a 4-byte grid locator produced by [`encode_grid`].
pub fn decode_grid(bytes: &[u8]) -> Result<String, CallsignError> {
    if bytes.len() < 4 {
        return Err(CallsignError::BadGrid(format!("{bytes:02x?}")));
    }
    let packed = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

    let pair = (packed >> 17) & 0x1ff;
    let digits = (packed >> 10) & 0x7f;
    let sub1 = (packed >> 5) & 0x1f;
    let sub2 = packed & 0x1f;

    if pair >= 18 * 18 || digits >= 100 {
        return Err(CallsignError::BadGrid(format!("{bytes:02x?}")));
    }

    let mut out = String::with_capacity(6);
    out.push((b'A' + (pair / 18) as u8) as char);
    out.push((b'A' + (pair % 18) as u8) as char);
    out.push((b'0' + (digits / 10) as u8) as char);
    out.push((b'0' + (digits % 10) as u8) as char);

    if sub1 != GRID_NO_SUBSQUARE && sub2 != GRID_NO_SUBSQUARE {
        if sub1 >= 24 || sub2 >= 24 {
            return Err(CallsignError::BadGrid(format!("{bytes:02x?}")));
        }
        out.push((b'A' + sub1 as u8) as char);
        out.push((b'A' + sub2 as u8) as char);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_callsign() {
        let call = Callsign::parse("dn2ls").unwrap();
        assert_eq!(call.base(), "DN2LS");
        assert_eq!(call.ssid(), None);
        assert_eq!(call.to_string(), "DN2LS");
    }

    #[test]
    fn test_parse_callsign_with_ssid() {
        let call = Callsign::parse("DN2LS-7").unwrap();
        assert_eq!(call.base(), "DN2LS");
        assert_eq!(call.ssid(), Some(7));
        assert_eq!(call.to_string(), "DN2LS-7");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Callsign::parse("").is_err());
        assert!(Callsign::parse("TOOLONGCALL").is_err());
        assert!(Callsign::parse("DN2LS-abc").is_err());
        assert!(Callsign::parse("DN2LS-300").is_err());
        assert!(Callsign::parse("DN2L$").is_err());
    }

    #[test]
    fn test_byte_round_trip() {
        let call = Callsign::parse("AA1BB-3").unwrap();
        let bytes = call.to_bytes();
        assert_eq!(&bytes[..5], b"AA1BB");
        assert_eq!(bytes[5], 0);

        // The wire form does not carry the SSID.
        let decoded = Callsign::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.base(), "AA1BB");
        assert_eq!(decoded.ssid(), None);
    }

    #[test]
    fn test_from_bytes_rejects_padding_only() {
        assert!(Callsign::from_bytes(&[0u8; 6]).is_err());
    }

    #[test]
    fn test_crc_ignores_ssid() {
        let plain = Callsign::parse("DN2LS").unwrap();
        let ssid7 = Callsign::parse("DN2LS-7").unwrap();
        assert_eq!(plain.crc(), ssid7.crc());
    }

    #[test]
    fn test_crc_distinguishes_stations() {
        let a = Callsign::parse("AA1AA").unwrap();
        let b = Callsign::parse("BB2BB").unwrap();
        assert_ne!(a.crc(), b.crc());
    }

    #[test]
    fn test_matches_crc_any_ssid() {
        let local = Callsign::parse("DN2LS-4").unwrap();
        let sender_view = Callsign::parse("DN2LS-12").unwrap();

        let (valid, effective) = local.matches_crc(&sender_view.crc());
        assert!(valid);
        assert_eq!(effective.base(), "DN2LS");

        let (valid, _) = local.matches_crc(&Callsign::parse("XX9XX").unwrap().crc());
        assert!(!valid);
    }

    #[test]
    fn test_payload_crc32_known_vector() {
        // CRC-32/ISO-HDLC of "123456789" is 0xCBF43926.
        assert_eq!(payload_crc32(b"123456789"), 0xCBF43926u32.to_be_bytes());
    }

    #[test]
    fn test_grid_round_trip_six_chars() {
        for grid in ["JN48EA", "AA00AA", "RR99XX", "FN31PR"] {
            let packed = encode_grid(grid).unwrap();
            assert_eq!(decode_grid(&packed).unwrap(), grid);
        }
    }

    #[test]
    fn test_grid_round_trip_four_chars() {
        let packed = encode_grid("JN48").unwrap();
        assert_eq!(decode_grid(&packed).unwrap(), "JN48");
    }

    #[test]
    fn test_grid_rejects_invalid() {
        assert!(encode_grid("ZZ00").is_err()); // field letters stop at R
        assert!(encode_grid("JN4").is_err());
        assert!(encode_grid("JN48EZ").is_err()); // subsquare stops at X
        assert!(decode_grid(&[0xff, 0xff, 0xff, 0xff]).is_err());
    }
}
