//! Transaction wire format
//!
//! Legacy message layout:
//! - header: required signatures, read-only signed, read-only unsigned (u8 each)
//! - account keys: compact-u16 length + 32-byte keys
//! - recent blockhash: 32 bytes
//! - instructions: compact-u16 length + (program index, account indices, data)
//!
//! A transaction is the compact-u16 signature list followed by the message.

/// System program id (all zero bytes, "111...1" in base58)
pub const SYSTEM_PROGRAM_ID: [u8; 32] = [0u8; 32];

/// System program instruction index for a plain transfer
const SYSTEM_TRANSFER_IX: u32 = 2;

pub fn decode_pubkey(s: &str) -> Result<[u8; 32], String> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| format!("invalid base58 address {}: {}", s, e))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("address {} is {} bytes, expected 32", s, bytes.len()))
}

pub fn decode_blockhash(s: &str) -> Result<[u8; 32], String> {
    decode_pubkey(s).map_err(|e| format!("blockhash: {}", e))
}

/// Append a compact-u16 ("shortvec") length
pub fn encode_compact_u16(out: &mut Vec<u8>, mut value: u16) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// Encode a message carrying one system transfer from `payer` to `payee`
pub fn encode_transfer_message(
    payer: &[u8; 32],
    payee: &[u8; 32],
    blockhash: &[u8; 32],
    lamports: u64,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(150);

    // payer signs and is writable, payee is writable, system program is read-only
    out.extend_from_slice(&[1, 0, 1]);

    encode_compact_u16(&mut out, 3);
    out.extend_from_slice(payer);
    out.extend_from_slice(payee);
    out.extend_from_slice(&SYSTEM_PROGRAM_ID);

    out.extend_from_slice(blockhash);

    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_IX.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    encode_compact_u16(&mut out, 1);
    out.push(2); // program id index
    encode_compact_u16(&mut out, 2);
    out.extend_from_slice(&[0, 1]);
    encode_compact_u16(&mut out, data.len() as u16);
    out.extend_from_slice(&data);

    out
}

pub fn encode_transaction(signatures: &[[u8; 64]], message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + signatures.len() * 64 + message.len());
    encode_compact_u16(&mut out, signatures.len() as u16);
    for sig in signatures {
        out.extend_from_slice(sig);
    }
    out.extend_from_slice(message);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_u16() {
        let cases: [(u16, &[u8]); 5] = [
            (0, &[0x00]),
            (0x7f, &[0x7f]),
            (0x80, &[0x80, 0x01]),
            (0x3fff, &[0xff, 0x7f]),
            (0xffff, &[0xff, 0xff, 0x03]),
        ];
        for (value, expected) in cases {
            let mut out = Vec::new();
            encode_compact_u16(&mut out, value);
            assert_eq!(out, expected, "value {}", value);
        }
    }

    #[test]
    fn test_system_program_base58() {
        assert_eq!(
            decode_pubkey("11111111111111111111111111111111").unwrap(),
            SYSTEM_PROGRAM_ID
        );
    }

    #[test]
    fn test_decode_pubkey_rejects_bad_input() {
        assert!(decode_pubkey("not-base58-0OIl").is_err());
        // valid base58 but only a few bytes
        assert!(decode_pubkey("abc").is_err());
    }

    #[test]
    fn test_transfer_message_layout() {
        let payer = [1u8; 32];
        let payee = [2u8; 32];
        let blockhash = [9u8; 32];
        let msg = encode_transfer_message(&payer, &payee, &blockhash, 50_000_000);

        // 3 header + 1 len + 96 keys + 32 blockhash + 1 ix count + 1 prog + 1 + 2 accounts + 1 + 12 data
        assert_eq!(msg.len(), 150);
        assert_eq!(&msg[0..3], &[1, 0, 1]);
        assert_eq!(msg[3], 3);
        assert_eq!(&msg[4..36], &payer);
        assert_eq!(&msg[36..68], &payee);
        assert_eq!(&msg[68..100], &SYSTEM_PROGRAM_ID);
        assert_eq!(&msg[100..132], &blockhash);
        assert_eq!(&msg[132..138], &[1, 2, 2, 0, 1, 12]);
        assert_eq!(&msg[138..142], &2u32.to_le_bytes());
        assert_eq!(&msg[142..150], &50_000_000u64.to_le_bytes());
    }

    #[test]
    fn test_transaction_prefixes_signatures() {
        let tx = encode_transaction(&[[7u8; 64]], &[1, 2, 3]);
        assert_eq!(tx.len(), 1 + 64 + 3);
        assert_eq!(tx[0], 1);
        assert_eq!(&tx[65..], &[1, 2, 3]);
    }
}
