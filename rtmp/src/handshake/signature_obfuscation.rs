//! Block permutation applied to C2/S2 signatures when the server answers an encrypted
//! handshake with type 8 (XTEA) or type 9 (Blowfish).
//!
//! Each 8 byte block of the signature is encrypted in place with the key chosen by
//! `key_source[block_start] % 15`.  Words are packed little endian in both ciphers.

use blowfish::cipher::generic_array::GenericArray;
use blowfish::cipher::{BlockEncrypt, KeyInit};
use blowfish::Blowfish;
use byteorder::{ByteOrder, LittleEndian};

const KEY_TABLE_SIZE: usize = 15;
const XTEA_ROUNDS: usize = 32;
const XTEA_DELTA: u32 = 0x9E37_79B9;

/// Key tables for signature obfuscation.  Both tables need at least 15 entries before they are
/// used, an unconfigured table leaves signatures untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignatureObfuscationKeys {
    pub xtea: Vec<[u32; 4]>,
    pub blowfish: Vec<[u8; 24]>,
}

impl SignatureObfuscationKeys {
    pub fn supports(&self, handshake_type: u8) -> bool {
        match handshake_type {
            8 => self.xtea.len() >= KEY_TABLE_SIZE,
            9 => self.blowfish.len() >= KEY_TABLE_SIZE,
            _ => false,
        }
    }
}

/// Obfuscates `signature` in place.  Returns false (leaving the signature alone) if the
/// handshake type doesn't call for obfuscation or no keys are configured for it.
pub fn obfuscate_signature(
    handshake_type: u8,
    key_source: &[u8; 32],
    signature: &mut [u8; 32],
    keys: &SignatureObfuscationKeys,
) -> bool {
    if !keys.supports(handshake_type) {
        return false;
    }

    for start in (0..signature.len()).step_by(8) {
        let key_index = (key_source[start] as usize) % KEY_TABLE_SIZE;
        let block = &mut signature[start..start + 8];

        if handshake_type == 8 {
            xtea_encrypt_block(block, &keys.xtea[key_index]);
        } else {
            let cipher = match Blowfish::<LittleEndian>::new_from_slice(&keys.blowfish[key_index]) {
                Ok(cipher) => cipher,
                Err(_) => return false,
            };

            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
    }

    true
}

fn xtea_encrypt_block(block: &mut [u8], key: &[u32; 4]) {
    let mut v0 = LittleEndian::read_u32(&block[0..4]);
    let mut v1 = LittleEndian::read_u32(&block[4..8]);
    let mut sum: u32 = 0;

    for _ in 0..XTEA_ROUNDS {
        v0 = v0.wrapping_add(
            ((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1) ^ sum.wrapping_add(key[(sum & 3) as usize]),
        );
        sum = sum.wrapping_add(XTEA_DELTA);
        v1 = v1.wrapping_add(
            ((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0)
                ^ sum.wrapping_add(key[((sum >> 11) & 3) as usize]),
        );
    }

    LittleEndian::write_u32(&mut block[0..4], v0);
    LittleEndian::write_u32(&mut block[4..8], v1);
}
