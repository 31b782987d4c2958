//! Offset derivation and HMAC-SHA256 digests used by the FP9 style handshake.
//!
//! Both peers hide a 32 byte digest somewhere inside their 1536 byte handshake packet.  Where
//! the digest lives is derived from four bytes at a fixed location in the same packet, using one
//! of two schemes.  A digest is the HMAC-SHA256 of the whole packet with the 32 digest bytes
//! left out.

use super::errors::HandshakeError;
use hmac::{Hmac, Mac, NewMac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SHA256_DIGEST_LENGTH: usize = 32;

/// "Genuine Adobe Flash Player 001" followed by 32 constant bytes.  The digest placed in C1 is
/// keyed with only the first 30 bytes.
pub const GENUINE_FP_KEY: [u8; 62] = [
    0x47, 0x65, 0x6E, 0x75, 0x69, 0x6E, 0x65, 0x20, 0x41, 0x64, 0x6F, 0x62, 0x65, 0x20, 0x46, 0x6C,
    0x61, 0x73, 0x68, 0x20, 0x50, 0x6C, 0x61, 0x79, 0x65, 0x72, 0x20, 0x30, 0x30, 0x31, 0xF0, 0xEE,
    0xC2, 0x4A, 0x80, 0x68, 0xBE, 0xE8, 0x2E, 0x00, 0xD0, 0xD1, 0x02, 0x9E, 0x7E, 0x57, 0x6E, 0xEC,
    0x5D, 0x2D, 0x29, 0x80, 0x6F, 0xAB, 0x93, 0xB8, 0xE6, 0x36, 0xCF, 0xEB, 0x31, 0xAE,
];

/// "Genuine Adobe Flash Media Server 001" followed by the same 32 constant bytes.  The digest
/// placed in S1 is keyed with only the first 36 bytes.
pub const GENUINE_FMS_KEY: [u8; 68] = [
    0x47, 0x65, 0x6E, 0x75, 0x69, 0x6E, 0x65, 0x20, 0x41, 0x64, 0x6F, 0x62, 0x65, 0x20, 0x46, 0x6C,
    0x61, 0x73, 0x68, 0x20, 0x4D, 0x65, 0x64, 0x69, 0x61, 0x20, 0x53, 0x65, 0x72, 0x76, 0x65, 0x72,
    0x20, 0x30, 0x30, 0x31, 0xF0, 0xEE, 0xC2, 0x4A, 0x80, 0x68, 0xBE, 0xE8, 0x2E, 0x00, 0xD0, 0xD1,
    0x02, 0x9E, 0x7E, 0x57, 0x6E, 0xEC, 0x5D, 0x2D, 0x29, 0x80, 0x6F, 0xAB, 0x93, 0xB8, 0xE6, 0x36,
    0xCF, 0xEB, 0x31, 0xAE,
];

pub const CLIENT_KEY_LENGTH: usize = 30;
pub const SERVER_KEY_LENGTH: usize = 36;

const DIGEST_WINDOW: u32 = 728;
const DH_WINDOW: u32 = 632;

/// Returns where the 32 byte digest lives inside a handshake packet (C1 or S1, without the
/// leading type byte).
///
/// * scheme 0: bytes 8..12 summed, modulo 728, plus 12
/// * scheme 1: bytes 772..776 summed, modulo 728, plus 776
pub fn digest_offset(scheme: u8, packet: &[u8]) -> Result<usize, HandshakeError> {
    let (sum_start, base) = match scheme {
        0 => (8, 12),
        1 => (772, 776),
        _ => return Err(HandshakeError::UnknownDigestScheme { scheme }),
    };

    let offset = sum_window(packet, sum_start)? % DIGEST_WINDOW + base;
    Ok(offset as usize)
}

/// Returns where the 128 byte Diffie-Hellman public key lives inside a handshake packet.
///
/// * scheme 0: bytes 1532..1536 summed, modulo 632, plus 772
/// * scheme 1: bytes 768..772 summed, modulo 632, plus 8
pub fn dh_offset(scheme: u8, packet: &[u8]) -> Result<usize, HandshakeError> {
    let (sum_start, base) = match scheme {
        0 => (1532, 772),
        1 => (768, 8),
        _ => return Err(HandshakeError::UnknownDigestScheme { scheme }),
    };

    let offset = sum_window(packet, sum_start)? % DH_WINDOW + base;
    Ok(offset as usize)
}

fn sum_window(packet: &[u8], start: usize) -> Result<u32, HandshakeError> {
    let window = packet
        .get(start..start + 4)
        .ok_or(HandshakeError::PacketTooShort {
            length: packet.len(),
        })?;

    Ok(window.iter().map(|&x| x as u32).sum())
}

pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; SHA256_DIGEST_LENGTH] {
    let mut mac = match HmacSha256::new_varkey(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("hmac accepts keys of any length"),
    };

    for part in parts {
        mac.update(part);
    }

    let mut result = [0_u8; SHA256_DIGEST_LENGTH];
    result.copy_from_slice(&mac.finalize().into_bytes());
    result
}

/// Computes the digest of `packet` with the 32 bytes at `offset` skipped over.
pub fn calculate_digest(
    packet: &[u8],
    offset: usize,
    key: &[u8],
) -> Result<[u8; SHA256_DIGEST_LENGTH], HandshakeError> {
    if offset + SHA256_DIGEST_LENGTH > packet.len() {
        return Err(HandshakeError::PacketTooShort {
            length: packet.len(),
        });
    }

    Ok(hmac_sha256(
        key,
        &[
            &packet[..offset],
            &packet[offset + SHA256_DIGEST_LENGTH..],
        ],
    ))
}

/// Checks if the digest stored at `offset` matches the digest of the rest of the packet
pub fn verify_digest(packet: &[u8], offset: usize, key: &[u8]) -> Result<bool, HandshakeError> {
    let expected = calculate_digest(packet, offset, key)?;
    Ok(packet[offset..offset + SHA256_DIGEST_LENGTH] == expected[..])
}

/// Finds the scheme whose digest offset verifies against `key`, trying `preferred_scheme` first.
pub fn find_valid_digest(
    packet: &[u8],
    preferred_scheme: u8,
    key: &[u8],
) -> Result<(u8, usize), HandshakeError> {
    for scheme in [preferred_scheme, preferred_scheme ^ 1].iter() {
        let offset = digest_offset(*scheme, packet)?;
        if verify_digest(packet, offset, key)? {
            return Ok((*scheme, offset));
        }
    }

    Err(HandshakeError::DigestVerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_with(bytes_at: &[(usize, u8)]) -> Vec<u8> {
        let mut packet = vec![0_u8; 1536];
        for (index, value) in bytes_at {
            packet[*index] = *value;
        }

        packet
    }

    #[test]
    fn scheme_0_digest_offset_sums_bytes_8_through_11() {
        let packet = packet_with(&[(8, 1), (9, 2), (10, 3), (11, 4)]);
        assert_eq!(digest_offset(0, &packet).unwrap(), 10 + 12);
    }

    #[test]
    fn scheme_1_digest_offset_sums_bytes_772_through_775() {
        let packet = packet_with(&[(772, 255), (773, 255), (774, 255), (775, 255)]);
        assert_eq!(digest_offset(1, &packet).unwrap(), 1020 % 728 + 776);
    }

    #[test]
    fn digest_offsets_stay_within_their_windows() {
        for value in 0..=255_u8 {
            let packet = vec![value; 1536];

            let offset = digest_offset(0, &packet).unwrap();
            assert!(offset >= 12 && offset < 12 + 728, "scheme 0 offset {}", offset);

            let offset = digest_offset(1, &packet).unwrap();
            assert!(offset >= 776 && offset < 776 + 728, "scheme 1 offset {}", offset);
            assert!(offset + SHA256_DIGEST_LENGTH <= 1536);
        }
    }

    #[test]
    fn digest_offset_is_deterministic() {
        let packet: Vec<u8> = (0..1536).map(|x| (x * 7 % 256) as u8).collect();
        assert_eq!(
            digest_offset(1, &packet).unwrap(),
            digest_offset(1, &packet).unwrap()
        );
    }

    #[test]
    fn unknown_scheme_is_an_error() {
        let packet = vec![0_u8; 1536];
        match digest_offset(2, &packet) {
            Err(HandshakeError::UnknownDigestScheme { scheme: 2 }) => (),
            x => panic!("Expected UnknownDigestScheme, instead received {:?}", x),
        }

        match dh_offset(7, &packet) {
            Err(HandshakeError::UnknownDigestScheme { scheme: 7 }) => (),
            x => panic!("Expected UnknownDigestScheme, instead received {:?}", x),
        }
    }

    #[test]
    fn dh_offsets_stay_within_their_windows() {
        for value in 0..=255_u8 {
            let packet = vec![value; 1536];

            let offset = dh_offset(0, &packet).unwrap();
            assert!(offset >= 772 && offset < 772 + 632);

            let offset = dh_offset(1, &packet).unwrap();
            assert!(offset >= 8 && offset < 8 + 632);
        }
    }

    #[test]
    fn short_packet_is_rejected() {
        match digest_offset(1, &[0_u8; 100]) {
            Err(HandshakeError::PacketTooShort { length: 100 }) => (),
            x => panic!("Expected PacketTooShort, instead received {:?}", x),
        }
    }

    #[test]
    fn keys_start_with_their_genuine_text() {
        assert_eq!(
            &GENUINE_FP_KEY[..CLIENT_KEY_LENGTH],
            b"Genuine Adobe Flash Player 001"
        );
        assert_eq!(
            &GENUINE_FMS_KEY[..SERVER_KEY_LENGTH],
            b"Genuine Adobe Flash Media Server 001"
        );
        assert_eq!(&GENUINE_FP_KEY[30..], &GENUINE_FMS_KEY[36..]);
    }

    #[test]
    fn written_digest_verifies_and_tampering_breaks_it() {
        let mut packet: Vec<u8> = (0..1536).map(|x| (x % 251) as u8).collect();
        let offset = digest_offset(0, &packet).unwrap();
        let digest = calculate_digest(&packet, offset, &GENUINE_FP_KEY[..CLIENT_KEY_LENGTH]).unwrap();
        packet[offset..offset + SHA256_DIGEST_LENGTH].copy_from_slice(&digest);

        assert!(verify_digest(&packet, offset, &GENUINE_FP_KEY[..CLIENT_KEY_LENGTH]).unwrap());
        assert!(!verify_digest(&packet, offset, &GENUINE_FMS_KEY[..SERVER_KEY_LENGTH]).unwrap());

        packet[1000] ^= 0xFF;
        assert!(!verify_digest(&packet, offset, &GENUINE_FP_KEY[..CLIENT_KEY_LENGTH]).unwrap());
    }

    #[test]
    fn digest_ignores_bytes_inside_the_gap() {
        let mut packet = vec![9_u8; 1536];
        let offset = digest_offset(0, &packet).unwrap();
        let before = calculate_digest(&packet, offset, b"key").unwrap();

        packet[offset + 5] = 0;
        let after = calculate_digest(&packet, offset, b"key").unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn find_valid_digest_falls_back_to_other_scheme() {
        let mut packet: Vec<u8> = (0..1536).map(|x| (x * 13 % 256) as u8).collect();
        let offset = digest_offset(1, &packet).unwrap();
        let digest = calculate_digest(&packet, offset, b"server").unwrap();
        packet[offset..offset + SHA256_DIGEST_LENGTH].copy_from_slice(&digest);

        let (scheme, found_offset) = find_valid_digest(&packet, 0, b"server").unwrap();
        assert_eq!(scheme, 1);
        assert_eq!(found_offset, offset);
    }

    #[test]
    fn find_valid_digest_fails_when_neither_scheme_verifies() {
        let packet = vec![1_u8; 1536];
        match find_valid_digest(&packet, 0, b"server") {
            Err(HandshakeError::DigestVerificationFailed) => (),
            x => panic!("Expected DigestVerificationFailed, instead received {:?}", x),
        }
    }
}
