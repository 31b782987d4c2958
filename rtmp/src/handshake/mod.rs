//! The client side of the RTMP handshake.
//!
//! Two variants are supported.  The plain handshake is the one described in the official RTMP
//! specification, where S2 is an echo of C1 and C2 is an echo of S1.  The FP9 handshake (used by
//! Flash Player 9 and later, and required by servers that expect h.264 capable players) hides an
//! HMAC-SHA256 digest inside C1 and S1 and signs C2 and S2 with keys derived from those digests.
//!
//! `ClientHandshake` is a stage machine that works on byte buffers, `perform()` drives it over
//! any blocking `Read + Write` transport.

mod digest;
mod errors;
mod signature_obfuscation;

pub use self::digest::{
    calculate_digest, dh_offset, digest_offset, verify_digest, GENUINE_FMS_KEY, GENUINE_FP_KEY,
};
pub use self::errors::HandshakeError;
pub use self::signature_obfuscation::{obfuscate_signature, SignatureObfuscationKeys};

use self::digest::{
    find_valid_digest, hmac_sha256, CLIENT_KEY_LENGTH, SERVER_KEY_LENGTH, SHA256_DIGEST_LENGTH,
};
use byteorder::{BigEndian, ByteOrder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{Read, Write};
use tracing::{debug, info, warn};

/// Size of C1, S1, C2 and S2
pub const PACKET_SIZE: usize = 1536;

const PLAIN_TYPE: u8 = 0x03;
const ENCRYPTED_TYPE: u8 = 0x06;
const FP9_VERSION: [u8; 4] = [10, 0, 45, 2];
const FP9_ENCRYPTED_VERSION: [u8; 4] = [128, 0, 3, 2];
const SIGNATURE_OFFSET: usize = PACKET_SIZE - SHA256_DIGEST_LENGTH;

/// Options controlling which handshake is attempted
#[derive(Clone, Debug, PartialEq)]
pub struct HandshakeConfig {
    /// Use the FP9 digest handshake.  When the server doesn't support it the handshake silently
    /// falls back to the plain variant.
    pub use_digest: bool,

    /// Request an encrypted (RTMPE style) session with a 0x06 type byte.  Only the handshake
    /// itself is performed, installing the RC4 keystreams is not supported.
    pub encrypted: bool,

    /// Seed for the filler bytes of C1 and C2.  When `None` the bytes come from the OS.
    pub seed: Option<u64>,

    /// Value for the uptime field of C1, defaults to zero
    pub uptime: Option<u32>,

    pub obfuscation_keys: SignatureObfuscationKeys,
}

impl HandshakeConfig {
    pub fn new() -> HandshakeConfig {
        HandshakeConfig {
            use_digest: true,
            encrypted: false,
            seed: None,
            uptime: None,
            obfuscation_keys: SignatureObfuscationKeys::default(),
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        HandshakeConfig::new()
    }
}

/// Hash and size of the player SWF, used to answer the server's SWF verification requests
#[derive(Clone, Debug, PartialEq)]
pub struct SwfVerification {
    pub hash: [u8; 32],
    pub size: u32,
}

/// Length of the payload sent back in a SWF verification user control response
pub const SWF_VERIFICATION_RESPONSE_SIZE: usize = 42;

impl SwfVerification {
    /// Builds the response to a SWF verification request: 0x01 0x01, the SWF size twice, then
    /// the HMAC of the last 32 bytes of S1 keyed with the SWF hash.
    pub fn response(&self, server_s1: &[u8]) -> [u8; SWF_VERIFICATION_RESPONSE_SIZE] {
        let mut response = [0_u8; SWF_VERIFICATION_RESPONSE_SIZE];
        response[0] = 0x01;
        response[1] = 0x01;
        BigEndian::write_u32(&mut response[2..6], self.size);
        BigEndian::write_u32(&mut response[6..10], self.size);

        let tail_start = server_s1.len().saturating_sub(SHA256_DIGEST_LENGTH);
        let signature = hmac_sha256(&self.hash, &[&server_s1[tail_start..]]);
        response[10..].copy_from_slice(&signature);
        response
    }
}

/// Where the Diffie-Hellman public keys sit inside C1 and S1
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DhOffsets {
    pub client: usize,
    pub server: usize,
}

/// Information gathered from a completed handshake
#[derive(Debug)]
pub struct HandshakeOutcome {
    pub server_type: u8,
    pub server_uptime: u32,
    pub server_version: [u8; 4],

    /// True if the FP9 digest handshake was used, false if the plain handshake was used
    /// (either by configuration or because the server didn't support it)
    pub used_digest: bool,

    pub encrypted: bool,
    pub dh_offsets: Option<DhOffsets>,
    pub signature_obfuscated: bool,
    pub swf_verification_response: Option<[u8; SWF_VERIFICATION_RESPONSE_SIZE]>,

    /// Non-fatal problems, such as `ServerNotGenuine` or `EchoMismatch`
    pub warnings: Vec<HandshakeError>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Stage {
    NeedToSendC0AndC1,
    WaitingForS0AndS1,
    WaitingForS2,
    Complete,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::NeedToSendC0AndC1 => "waiting to send C0 and C1",
            Stage::WaitingForS0AndS1 => "waiting for S0 and S1",
            Stage::WaitingForS2 => "waiting for S2",
            Stage::Complete => "complete",
        }
    }
}

pub struct ClientHandshake {
    config: HandshakeConfig,
    swf_verification: Option<SwfVerification>,
    stage: Stage,
    rng: StdRng,
    use_digest: bool,
    digest_scheme: u8,
    c1: Vec<u8>,
    client_digest: [u8; SHA256_DIGEST_LENGTH],
    client_dh_offset: Option<usize>,
    server_type: u8,
    server_uptime: u32,
    server_version: [u8; 4],
    dh_offsets: Option<DhOffsets>,
    signature_obfuscated: bool,
    swf_verification_response: Option<[u8; SWF_VERIFICATION_RESPONSE_SIZE]>,
    warnings: Vec<HandshakeError>,
}

impl ClientHandshake {
    pub fn new(config: HandshakeConfig, swf_verification: Option<SwfVerification>) -> ClientHandshake {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        ClientHandshake {
            use_digest: config.use_digest,
            digest_scheme: if config.encrypted { 1 } else { 0 },
            config,
            swf_verification,
            stage: Stage::NeedToSendC0AndC1,
            rng,
            c1: Vec::new(),
            client_digest: [0; SHA256_DIGEST_LENGTH],
            client_dh_offset: None,
            server_type: 0,
            server_uptime: 0,
            server_version: [0; 4],
            dh_offsets: None,
            signature_obfuscated: false,
            swf_verification_response: None,
            warnings: Vec::new(),
        }
    }

    /// Creates the 1537 bytes of C0 and C1
    pub fn generate_c0_c1(&mut self) -> Result<Vec<u8>, HandshakeError> {
        self.expect_stage(Stage::NeedToSendC0AndC1)?;

        let mut c1 = vec![0_u8; PACKET_SIZE];
        BigEndian::write_u32(&mut c1[0..4], self.config.uptime.unwrap_or(0));
        if self.use_digest {
            let version = if self.config.encrypted {
                FP9_ENCRYPTED_VERSION
            } else {
                FP9_VERSION
            };

            c1[4..8].copy_from_slice(&version);
        }

        self.rng.fill(&mut c1[8..]);

        if self.config.encrypted {
            // The public key would be written here, but the key exchange itself isn't supported
            let offset = dh_offset(self.digest_scheme, &c1)?;
            debug!(offset, "Client Diffie-Hellman key offset derived");
            self.client_dh_offset = Some(offset);
        }

        if self.use_digest {
            let offset = digest_offset(self.digest_scheme, &c1)?;
            let digest = calculate_digest(&c1, offset, &GENUINE_FP_KEY[..CLIENT_KEY_LENGTH])?;
            c1[offset..offset + SHA256_DIGEST_LENGTH].copy_from_slice(&digest);
            self.client_digest = digest;

            debug!(offset, scheme = self.digest_scheme, "Client digest written into C1");
        }

        let mut bytes = Vec::with_capacity(PACKET_SIZE + 1);
        bytes.push(self.client_type());
        bytes.extend_from_slice(&c1);

        self.c1 = c1;
        self.stage = Stage::WaitingForS0AndS1;
        Ok(bytes)
    }

    /// Processes the 1537 bytes of S0 and S1, returning the bytes of C2 to send back.
    ///
    /// Fails with `DigestVerificationFailed` if the server claims FP9 support but no valid digest
    /// can be found in S1.
    pub fn process_s0_s1(&mut self, bytes: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        self.expect_stage(Stage::WaitingForS0AndS1)?;
        expect_size(bytes, PACKET_SIZE + 1)?;

        self.server_type = bytes[0];
        if self.server_type != self.client_type() {
            warn!(
                requested = self.client_type(),
                received = self.server_type,
                "Server responded with a different handshake type"
            );
        }

        let s1 = &bytes[1..];
        self.server_uptime = BigEndian::read_u32(&s1[0..4]);
        self.server_version.copy_from_slice(&s1[4..8]);

        info!(
            uptime = self.server_uptime,
            version = ?self.server_version,
            "Received S1 from server"
        );

        if self.use_digest && s1[4] == 0 {
            info!("Server does not support the FP9 handshake, falling back to the plain handshake");
            self.use_digest = false;
        }

        if !self.use_digest {
            self.stage = Stage::WaitingForS2;
            return Ok(s1.to_vec());
        }

        let (scheme, server_offset) =
            find_valid_digest(s1, self.digest_scheme, &GENUINE_FMS_KEY[..SERVER_KEY_LENGTH])?;

        if scheme != self.digest_scheme {
            debug!(scheme, "Server digest found with the alternate scheme");
        }

        let server_digest = &s1[server_offset..server_offset + SHA256_DIGEST_LENGTH];

        if let Some(ref swf) = self.swf_verification {
            self.swf_verification_response = Some(swf.response(s1));
        }

        if let Some(client) = self.client_dh_offset {
            let server = dh_offset(scheme, s1)?;
            debug!(server, "Server Diffie-Hellman key offset derived");
            self.dh_offsets = Some(DhOffsets { client, server });
        }

        let mut c2 = vec![0_u8; PACKET_SIZE];
        self.rng.fill(&mut c2[..]);

        let digest_response = hmac_sha256(&GENUINE_FP_KEY, &[server_digest]);
        let mut signature = hmac_sha256(&digest_response, &[&c2[..SIGNATURE_OFFSET]]);
        self.signature_obfuscated = obfuscate_signature(
            self.server_type,
            &digest_response,
            &mut signature,
            &self.config.obfuscation_keys,
        );

        c2[SIGNATURE_OFFSET..].copy_from_slice(&signature);

        self.stage = Stage::WaitingForS2;
        Ok(c2)
    }

    /// Processes the 1536 bytes of S2 and completes the handshake.  A bad signature (or a bad echo
    /// for the plain handshake) only results in a warning.
    pub fn process_s2(&mut self, bytes: &[u8]) -> Result<HandshakeOutcome, HandshakeError> {
        self.expect_stage(Stage::WaitingForS2)?;
        expect_size(bytes, PACKET_SIZE)?;

        if self.use_digest {
            let digest = hmac_sha256(&GENUINE_FMS_KEY, &[&self.client_digest[..]]);
            let mut signature = hmac_sha256(&digest, &[&bytes[..SIGNATURE_OFFSET]]);
            obfuscate_signature(
                self.server_type,
                &digest,
                &mut signature,
                &self.config.obfuscation_keys,
            );

            if bytes[SIGNATURE_OFFSET..] != signature[..] {
                warn!("Server S2 signature did not match, server is not a genuine Adobe server");
                self.warnings.push(HandshakeError::ServerNotGenuine);
            }
        } else if bytes != &self.c1[..] {
            warn!("Server S2 did not echo our C1 bytes");
            self.warnings.push(HandshakeError::EchoMismatch);
        }

        self.stage = Stage::Complete;
        info!(digest = self.use_digest, "Handshake completed");

        Ok(HandshakeOutcome {
            server_type: self.server_type,
            server_uptime: self.server_uptime,
            server_version: self.server_version,
            used_digest: self.use_digest,
            encrypted: self.config.encrypted,
            dh_offsets: self.dh_offsets,
            signature_obfuscated: self.signature_obfuscated,
            swf_verification_response: self.swf_verification_response,
            warnings: self.warnings.drain(..).collect(),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Complete
    }

    fn client_type(&self) -> u8 {
        if self.config.encrypted {
            ENCRYPTED_TYPE
        } else {
            PLAIN_TYPE
        }
    }

    fn expect_stage(&self, stage: Stage) -> Result<(), HandshakeError> {
        if self.stage != stage {
            return Err(HandshakeError::OutOfOrder {
                stage: self.stage.name(),
            });
        }

        Ok(())
    }
}

fn expect_size(bytes: &[u8], expected: usize) -> Result<(), HandshakeError> {
    if bytes.len() != expected {
        return Err(HandshakeError::UnexpectedPacketSize {
            expected,
            received: bytes.len(),
        });
    }

    Ok(())
}

/// Runs the whole handshake over a blocking transport
pub fn perform<S: Read + Write>(
    stream: &mut S,
    config: HandshakeConfig,
    swf_verification: Option<SwfVerification>,
) -> Result<HandshakeOutcome, HandshakeError> {
    let mut handshake = ClientHandshake::new(config, swf_verification);

    let c0_c1 = handshake.generate_c0_c1()?;
    stream.write_all(&c0_c1)?;
    stream.flush()?;

    let mut s0_s1 = vec![0_u8; PACKET_SIZE + 1];
    stream.read_exact(&mut s0_s1)?;
    let c2 = handshake.process_s0_s1(&s0_s1)?;
    stream.write_all(&c2)?;
    stream.flush()?;

    let mut s2 = vec![0_u8; PACKET_SIZE];
    stream.read_exact(&mut s2)?;
    handshake.process_s2(&s2)
}
