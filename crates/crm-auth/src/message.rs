//! NTLM message encoding and decoding.
//!
//! Implements the three NTLM messages (negotiate, challenge, authenticate)
//! as they travel in `Authorization` / `WWW-Authenticate` headers:
//! `NTLM <base64>`. Responses are computed with NTLMv2 (MD4 NT hash,
//! HMAC-MD5 proof over the server challenge and a timestamped blob).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;

use crate::credentials::NtlmCredentials;
use crate::error::{Error, ErrorKind, Result};

type HmacMd5 = Hmac<Md5>;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_OEM: u32 = 0x0000_0002;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_OEM_DOMAIN_SUPPLIED: u32 = 0x0000_1000;
const NEGOTIATE_OEM_WORKSTATION_SUPPLIED: u32 = 0x0000_2000;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SECURITY: u32 = 0x0008_0000;
const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;

/// Seconds between the Windows FILETIME epoch (1601) and the Unix epoch.
const FILETIME_UNIX_OFFSET_SECS: u64 = 11_644_473_600;

/// Build the negotiate (type 1) message header value.
pub fn negotiate_message(credentials: &NtlmCredentials) -> String {
    let domain = credentials.domain.to_uppercase();
    let workstation = credentials.workstation.to_uppercase();

    let mut flags = NEGOTIATE_UNICODE
        | NEGOTIATE_OEM
        | REQUEST_TARGET
        | NEGOTIATE_NTLM
        | NEGOTIATE_ALWAYS_SIGN
        | NEGOTIATE_EXTENDED_SECURITY;
    if !domain.is_empty() {
        flags |= NEGOTIATE_OEM_DOMAIN_SUPPLIED;
    }
    if !workstation.is_empty() {
        flags |= NEGOTIATE_OEM_WORKSTATION_SUPPLIED;
    }

    // Fixed header: signature, type, flags, domain/workstation security
    // buffers, 8 reserved bytes. Workstation payload precedes domain.
    const HEADER_LEN: usize = 40;
    let mut buf = Vec::with_capacity(HEADER_LEN + domain.len() + workstation.len());
    buf.extend_from_slice(SIGNATURE);
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    write_security_buffer(&mut buf, domain.len(), HEADER_LEN + workstation.len());
    write_security_buffer(&mut buf, workstation.len(), HEADER_LEN);
    buf.extend_from_slice(&[0u8; 8]);
    buf.extend_from_slice(workstation.as_bytes());
    buf.extend_from_slice(domain.as_bytes());

    format!("NTLM {}", BASE64.encode(&buf))
}

/// The server challenge (type 2) message, parsed from `WWW-Authenticate`.
#[derive(Debug, Clone)]
pub struct ServerChallenge {
    /// Flags negotiated by the server.
    pub flags: u32,
    /// The 8-byte server challenge nonce.
    pub challenge: [u8; 8],
    /// Target information block, echoed back inside the NTLMv2 blob.
    pub target_info: Vec<u8>,
}

impl ServerChallenge {
    /// Parse a `WWW-Authenticate` header value into a server challenge.
    ///
    /// The header may advertise several schemes (`Negotiate, NTLM <token>`);
    /// only the NTLM entry is considered.
    pub fn parse(header: &str) -> Result<Self> {
        let token = extract_ntlm_token(header)?;
        let raw = BASE64.decode(token).map_err(|e| {
            Error::with_source(
                ErrorKind::Challenge("challenge is not valid base64".to_string()),
                e,
            )
        })?;

        if raw.len() < 32 {
            return Err(Error::new(ErrorKind::Challenge(
                "truncated type 2 message".to_string(),
            )));
        }
        if &raw[0..8] != SIGNATURE {
            return Err(Error::new(ErrorKind::Challenge(
                "missing NTLMSSP signature".to_string(),
            )));
        }
        let message_type = read_u32(&raw, 8);
        if message_type != 2 {
            return Err(Error::new(ErrorKind::Challenge(format!(
                "expected type 2 message, got type {message_type}"
            ))));
        }

        let flags = read_u32(&raw, 20);
        let mut challenge = [0u8; 8];
        challenge.copy_from_slice(&raw[24..32]);

        let mut target_info = Vec::new();
        if flags & NEGOTIATE_TARGET_INFO != 0 && raw.len() >= 48 {
            let len = read_u16(&raw, 40) as usize;
            let offset = read_u32(&raw, 44) as usize;
            let end = offset.checked_add(len).ok_or_else(|| {
                Error::new(ErrorKind::Challenge("target info out of bounds".to_string()))
            })?;
            if end > raw.len() {
                return Err(Error::new(ErrorKind::Challenge(
                    "target info out of bounds".to_string(),
                )));
            }
            target_info.extend_from_slice(&raw[offset..end]);
        }

        Ok(Self {
            flags,
            challenge,
            target_info,
        })
    }
}

/// Build the authenticate (type 3) message header value.
pub fn authenticate_message(challenge: &ServerChallenge, credentials: &NtlmCredentials) -> String {
    let client_nonce: [u8; 8] = rand::random();
    let timestamp = filetime_now();
    build_authenticate(challenge, credentials, &client_nonce, timestamp)
}

fn build_authenticate(
    challenge: &ServerChallenge,
    credentials: &NtlmCredentials,
    client_nonce: &[u8; 8],
    timestamp: u64,
) -> String {
    let unicode = challenge.flags & NEGOTIATE_UNICODE != 0;
    let encode = |s: &str| -> Vec<u8> {
        if unicode {
            utf16le(s)
        } else {
            s.as_bytes().to_vec()
        }
    };
    let domain = encode(&credentials.domain);
    let username = encode(&credentials.username);
    let workstation = encode(&credentials.workstation);

    let hash = ntowf_v2(
        credentials.password(),
        &credentials.username,
        &credentials.domain,
    );
    let blob = ntlmv2_blob(timestamp, client_nonce, &challenge.target_info);

    let mut proof_input = Vec::with_capacity(8 + blob.len());
    proof_input.extend_from_slice(&challenge.challenge);
    proof_input.extend_from_slice(&blob);
    let nt_proof = hmac_md5(&hash, &proof_input);
    let mut nt_response = nt_proof.to_vec();
    nt_response.extend_from_slice(&blob);

    let mut lm_input = Vec::with_capacity(16);
    lm_input.extend_from_slice(&challenge.challenge);
    lm_input.extend_from_slice(client_nonce);
    let mut lm_response = hmac_md5(&hash, &lm_input).to_vec();
    lm_response.extend_from_slice(client_nonce);

    // Fixed header: signature, type, six security buffers, flags.
    const HEADER_LEN: usize = 64;
    let domain_offset = HEADER_LEN;
    let username_offset = domain_offset + domain.len();
    let workstation_offset = username_offset + username.len();
    let lm_offset = workstation_offset + workstation.len();
    let nt_offset = lm_offset + lm_response.len();
    let end_offset = nt_offset + nt_response.len();

    let mut buf = Vec::with_capacity(end_offset);
    buf.extend_from_slice(SIGNATURE);
    buf.extend_from_slice(&3u32.to_le_bytes());
    write_security_buffer(&mut buf, lm_response.len(), lm_offset);
    write_security_buffer(&mut buf, nt_response.len(), nt_offset);
    write_security_buffer(&mut buf, domain.len(), domain_offset);
    write_security_buffer(&mut buf, username.len(), username_offset);
    write_security_buffer(&mut buf, workstation.len(), workstation_offset);
    write_security_buffer(&mut buf, 0, end_offset);
    buf.extend_from_slice(&challenge.flags.to_le_bytes());
    buf.extend_from_slice(&domain);
    buf.extend_from_slice(&username);
    buf.extend_from_slice(&workstation);
    buf.extend_from_slice(&lm_response);
    buf.extend_from_slice(&nt_response);

    format!("NTLM {}", BASE64.encode(&buf))
}

/// NTOWFv2: HMAC-MD5 of the uppercased user + domain, keyed by the NT hash.
fn ntowf_v2(password: &str, username: &str, domain: &str) -> [u8; 16] {
    let mut md4 = Md4::new();
    md4.update(utf16le(password));
    let nt_hash = md4.finalize();

    let identity = utf16le(&format!("{}{}", username.to_uppercase(), domain));
    hmac_md5(&nt_hash, &identity)
}

/// The timestamped NTLMv2 blob the proof is computed over.
fn ntlmv2_blob(timestamp: u64, client_nonce: &[u8; 8], target_info: &[u8]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(28 + target_info.len() + 4);
    blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(client_nonce);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&[0u8; 4]);
    blob
}

fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    // HMAC-MD5 accepts keys of any length, so construction cannot fail.
    let mut mac =
        HmacMd5::new_from_slice(key).expect("HMAC-MD5 accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn filetime_now() -> u64 {
    let unix_secs = chrono::Utc::now().timestamp().max(0) as u64;
    (unix_secs + FILETIME_UNIX_OFFSET_SECS) * 10_000_000
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn write_security_buffer(buf: &mut Vec<u8>, len: usize, offset: usize) {
    buf.extend_from_slice(&(len as u16).to_le_bytes());
    buf.extend_from_slice(&(len as u16).to_le_bytes());
    buf.extend_from_slice(&(offset as u32).to_le_bytes());
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn extract_ntlm_token(header: &str) -> Result<&str> {
    for entry in header.split(',') {
        let entry = entry.trim();
        if let Some(rest) = entry.strip_prefix("NTLM") {
            let token = rest.trim();
            if token.is_empty() {
                return Err(Error::new(ErrorKind::Challenge(
                    "NTLM challenge carries no token".to_string(),
                )));
            }
            return Ok(token);
        }
    }
    Err(Error::new(ErrorKind::Challenge(
        "no NTLM entry in www-authenticate header".to_string(),
    )))
}
