//! DNS wire-format parsing and construction.
//!
//! Covers the subset of the message format this server speaks: the 12-byte
//! header, a single question, and A-type answer records whose owner name is
//! a compression pointer back at the question name.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Length of the fixed DNS message header.
pub const HEADER_LEN: usize = 12;

/// Smallest well-formed query: header plus a one-label question.
pub const MIN_QUERY_LEN: usize = HEADER_LEN + 6;

/// Size of one encoded A answer record.
pub const A_RECORD_LEN: usize = 16;

pub const QTYPE_A: u16 = 1;
pub const QTYPE_AAAA: u16 = 28;
pub const QCLASS_IN: u16 = 1;

pub const RCODE_NO_ERROR: u8 = 0;
pub const RCODE_FORMAT_ERROR: u8 = 1;
pub const RCODE_SERVER_FAILURE: u8 = 2;
pub const RCODE_NAME_NOT_FOUND: u8 = 3;
pub const RCODE_NOT_IMPLEMENTED: u8 = 4;
pub const RCODE_REFUSED: u8 = 5;

/// Owner name of every answer record: a compression pointer to offset 12,
/// where the question name sits immediately after the header.
const NAME_POINTER: [u8; 2] = [0xC0, 0x0C];

/// Display name for a query type. AAAA is recognized for logging only.
pub fn qtype_name(qtype: u16) -> &'static str {
    match qtype {
        QTYPE_A => "A",
        QTYPE_AAAA => "AAAA",
        _ => "???",
    }
}

/// Display name for a query class.
pub fn qclass_name(qclass: u16) -> &'static str {
    match qclass {
        QCLASS_IN => "IN",
        _ => "???",
    }
}

/// Display name for a response code.
pub fn rcode_name(rcode: u8) -> &'static str {
    match rcode {
        RCODE_NO_ERROR => "NO_ERROR",
        RCODE_FORMAT_ERROR => "FORMAT_ERROR",
        RCODE_SERVER_FAILURE => "SERVER_FAILURE",
        RCODE_NAME_NOT_FOUND => "NAME_NOT_FOUND",
        RCODE_NOT_IMPLEMENTED => "NOT_IMPLEMENTED",
        RCODE_REFUSED => "REFUSED",
        _ => "???",
    }
}

/// Why a datagram failed structural decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("packet truncated at {0} bytes")]
    Truncated(usize),
    #[error("label length walks past end of packet")]
    LabelOverrun,
    #[error("label is not valid UTF-8")]
    InvalidLabel,
    #[error("question name has no labels")]
    EmptyName,
}

/// The 16-bit header flag field, unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub response: bool,
    pub opcode: u8,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub z: bool,
    pub authentic_data: bool,
    pub checking_disabled: bool,
    pub rcode: u8,
}

impl Flags {
    /// Unpack the bitfield from its wire representation.
    pub fn unpack(bits: u16) -> Self {
        Self {
            response: bits & 0x8000 != 0,
            opcode: ((bits >> 11) & 0xf) as u8,
            authoritative: bits & 0x0400 != 0,
            truncated: bits & 0x0200 != 0,
            recursion_desired: bits & 0x0100 != 0,
            recursion_available: bits & 0x0080 != 0,
            z: bits & 0x0040 != 0,
            authentic_data: bits & 0x0020 != 0,
            checking_disabled: bits & 0x0010 != 0,
            rcode: (bits & 0xf) as u8,
        }
    }

    /// Pack the flags back into wire representation.
    pub fn pack(self) -> u16 {
        (self.response as u16) << 15
            | ((self.opcode & 0xf) as u16) << 11
            | (self.authoritative as u16) << 10
            | (self.truncated as u16) << 9
            | (self.recursion_desired as u16) << 8
            | (self.recursion_available as u16) << 7
            | (self.z as u16) << 6
            | (self.authentic_data as u16) << 5
            | (self.checking_disabled as u16) << 4
            | (self.rcode & 0xf) as u16
    }
}

/// The fixed 12-byte DNS message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: Flags,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    /// Decode the header from the first 12 bytes of a datagram.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::Truncated(data.len()));
        }

        Ok(Self {
            id: u16::from_be_bytes([data[0], data[1]]),
            flags: Flags::unpack(u16::from_be_bytes([data[2], data[3]])),
            qdcount: u16::from_be_bytes([data[4], data[5]]),
            ancount: u16::from_be_bytes([data[6], data[7]]),
            nscount: u16::from_be_bytes([data[8], data[9]]),
            arcount: u16::from_be_bytes([data[10], data[11]]),
        })
    }

    /// Append the 12-byte wire representation to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&self.flags.pack().to_be_bytes());
        buf.extend_from_slice(&self.qdcount.to_be_bytes());
        buf.extend_from_slice(&self.ancount.to_be_bytes());
        buf.extend_from_slice(&self.nscount.to_be_bytes());
        buf.extend_from_slice(&self.arcount.to_be_bytes());
    }
}

/// The single question carried by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl Question {
    /// Decode the question section starting at byte 12.
    ///
    /// Every label read is bounds-checked against the remaining buffer, so
    /// a crafted length byte fails with `LabelOverrun` instead of walking
    /// out of the datagram.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut pos = HEADER_LEN;
        let mut labels: Vec<&str> = Vec::new();

        loop {
            let len = *data.get(pos).ok_or(DecodeError::LabelOverrun)? as usize;
            pos += 1;
            if len == 0 {
                break;
            }

            let label = data.get(pos..pos + len).ok_or(DecodeError::LabelOverrun)?;
            labels.push(std::str::from_utf8(label).map_err(|_| DecodeError::InvalidLabel)?);
            pos += len;
        }

        if labels.is_empty() {
            return Err(DecodeError::EmptyName);
        }

        let rest = data.get(pos..pos + 4).ok_or(DecodeError::LabelOverrun)?;

        Ok(Self {
            name: labels.join("."),
            qtype: u16::from_be_bytes([rest[0], rest[1]]),
            qclass: u16::from_be_bytes([rest[2], rest[3]]),
        })
    }

    /// Append the label-encoded question to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        for label in self.name.split('.') {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
        buf.push(0);
        buf.extend_from_slice(&self.qtype.to_be_bytes());
        buf.extend_from_slice(&self.qclass.to_be_bytes());
    }

    /// Encoded size: one length byte per label (one per dot, plus one for
    /// the first label), the zero terminator, then type and class.
    pub fn encoded_len(&self) -> usize {
        self.name.len() + 6
    }
}

/// Append one A answer record to `buf`.
///
/// The record is always 16 bytes: the name pointer, type, class, TTL,
/// RDLENGTH of 4, and the address octets.
pub fn encode_a_record(buf: &mut Vec<u8>, addr: Ipv4Addr, ttl: u32) {
    buf.extend_from_slice(&NAME_POINTER);
    buf.extend_from_slice(&QTYPE_A.to_be_bytes());
    buf.extend_from_slice(&QCLASS_IN.to_be_bytes());
    buf.extend_from_slice(&ttl.to_be_bytes());
    buf.extend_from_slice(&4u16.to_be_bytes());
    buf.extend_from_slice(&addr.octets());
}

/// A response under construction: the echoed question plus any answers.
#[derive(Debug, Clone)]
pub struct Response {
    pub header: Header,
    pub question: Question,
    pub answers: Vec<Ipv4Addr>,
    pub ttl: u32,
}

impl Response {
    fn new(
        query: &Header,
        question: Question,
        rcode: u8,
        answers: Vec<Ipv4Addr>,
        ttl: u32,
    ) -> Self {
        let mut header = query.clone();
        header.flags.response = true;
        header.flags.rcode = rcode;
        // Counts must reflect what we actually serialize, not what the
        // query claimed to carry.
        header.qdcount = 1;
        header.ancount = answers.len() as u16;
        header.nscount = 0;
        header.arcount = 0;

        Self {
            header,
            question,
            answers,
            ttl,
        }
    }

    /// A NO_ERROR response carrying one record per address, in table order.
    pub fn answer(query: &Header, question: Question, addrs: &[Ipv4Addr], ttl: u32) -> Self {
        Self::new(query, question, RCODE_NO_ERROR, addrs.to_vec(), ttl)
    }

    /// Known name, unsupported type or class: NOT_IMPLEMENTED with the
    /// question echoed and no answers.
    pub fn not_implemented(query: &Header, question: Question) -> Self {
        Self::new(query, question, RCODE_NOT_IMPLEMENTED, Vec::new(), 0)
    }

    /// Upstream relay failed: SERVER_FAILURE with the question echoed.
    pub fn server_failure(query: &Header, question: Question) -> Self {
        Self::new(query, question, RCODE_SERVER_FAILURE, Vec::new(), 0)
    }

    /// Encode the response to wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(
            HEADER_LEN + self.question.encoded_len() + A_RECORD_LEN * self.answers.len(),
        );

        self.header.encode(&mut data);
        self.question.encode(&mut data);
        for addr in &self.answers {
            encode_a_record(&mut data, *addr, self.ttl);
        }

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_query(id: u16, name: &str, qtype: u16, qclass: u16) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&id.to_be_bytes());
        data.extend_from_slice(&[0x01, 0x00]); // standard query, RD set
        data.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        for label in name.split('.') {
            data.push(label.len() as u8);
            data.extend_from_slice(label.as_bytes());
        }
        data.push(0);
        data.extend_from_slice(&qtype.to_be_bytes());
        data.extend_from_slice(&qclass.to_be_bytes());
        data
    }

    #[test]
    fn flags_round_trip() {
        for bits in [0x0000, 0x0100, 0x8180, 0x8583, 0xffff, 0x2934] {
            assert_eq!(Flags::unpack(bits).pack(), bits);
        }

        let flags = Flags {
            response: true,
            opcode: 2,
            recursion_desired: true,
            rcode: RCODE_NOT_IMPLEMENTED,
            ..Flags::default()
        };
        assert_eq!(Flags::unpack(flags.pack()), flags);
    }

    #[test]
    fn header_round_trip() {
        let raw = [
            0x12, 0x34, 0x85, 0x83, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01,
        ];
        let header = Header::decode(&raw).unwrap();

        assert_eq!(header.id, 0x1234);
        assert!(header.flags.response);
        assert!(header.flags.authoritative);
        assert!(header.flags.recursion_desired);
        assert!(header.flags.recursion_available);
        assert_eq!(header.flags.rcode, RCODE_NAME_NOT_FOUND);
        assert_eq!(header.qdcount, 1);
        assert_eq!(header.ancount, 2);
        assert_eq!(header.arcount, 1);

        let mut encoded = Vec::new();
        header.encode(&mut encoded);
        assert_eq!(encoded, raw);
    }

    #[test]
    fn header_decode_rejects_short_input() {
        assert_eq!(Header::decode(&[0u8; 11]), Err(DecodeError::Truncated(11)));
    }

    #[test]
    fn question_round_trip() {
        let query = build_query(1, "www.example.com", QTYPE_A, QCLASS_IN);
        let question = Question::decode(&query).unwrap();

        assert_eq!(question.name, "www.example.com");
        assert_eq!(question.qtype, QTYPE_A);
        assert_eq!(question.qclass, QCLASS_IN);

        let mut encoded = Vec::new();
        question.encode(&mut encoded);
        assert_eq!(encoded, query[HEADER_LEN..]);
        assert_eq!(encoded.len(), question.encoded_len());
    }

    #[test]
    fn question_decode_rejects_overrunning_label() {
        // A length byte claiming 63 bytes with only 6 remaining.
        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(&[63, b'a', b'b', 0, 0, 1, 0]);

        assert_eq!(Question::decode(&data), Err(DecodeError::LabelOverrun));
    }

    #[test]
    fn question_decode_rejects_missing_terminator() {
        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(&[3, b'c', b'o', b'm']);

        assert_eq!(Question::decode(&data), Err(DecodeError::LabelOverrun));
    }

    #[test]
    fn question_decode_rejects_root_name() {
        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(&[0, 0, 1, 0, 1, 0, 0]);

        assert_eq!(Question::decode(&data), Err(DecodeError::EmptyName));
    }

    #[test]
    fn a_record_layout() {
        let mut data = Vec::new();
        encode_a_record(&mut data, Ipv4Addr::new(123, 123, 123, 123), 300);

        assert_eq!(
            data,
            [
                0xC0, 0x0C, // pointer to the question name
                0x00, 0x01, // TYPE A
                0x00, 0x01, // CLASS IN
                0x00, 0x00, 0x01, 0x2C, // TTL 300
                0x00, 0x04, // RDLENGTH
                123, 123, 123, 123,
            ]
        );
    }

    #[test]
    fn answer_response_layout() {
        let query = build_query(0x1234, "www.example.com", QTYPE_A, QCLASS_IN);
        let header = Header::decode(&query).unwrap();
        let question = Question::decode(&query).unwrap();

        let addrs = [Ipv4Addr::new(1, 2, 3, 4), Ipv4Addr::new(11, 22, 33, 44)];
        let bytes = Response::answer(&header, question, &addrs, 300).to_bytes();

        let header = Header::decode(&bytes).unwrap();
        assert!(header.flags.response);
        assert!(header.flags.recursion_desired); // echoed from the query
        assert_eq!(header.flags.rcode, RCODE_NO_ERROR);
        assert_eq!(header.qdcount, 1);
        assert_eq!(header.ancount, 2);
        assert_eq!(header.nscount, 0);
        assert_eq!(header.arcount, 0);

        // Question echoed unchanged, answers packed contiguously after it.
        assert_eq!(bytes[HEADER_LEN..query.len()], query[HEADER_LEN..]);
        assert_eq!(bytes.len(), query.len() + 2 * A_RECORD_LEN);
        assert_eq!(bytes[query.len()..query.len() + 2], [0xC0, 0x0C]);
        assert_eq!(bytes[query.len() + 12..query.len() + 16], [1, 2, 3, 4]);
        assert_eq!(
            bytes[query.len() + A_RECORD_LEN + 12..],
            [11, 22, 33, 44]
        );
    }

    #[test]
    fn error_responses_carry_no_answers() {
        let query = build_query(7, "www.example.com", QTYPE_AAAA, QCLASS_IN);
        let header = Header::decode(&query).unwrap();
        let question = Question::decode(&query).unwrap();

        let bytes = Response::not_implemented(&header, question.clone()).to_bytes();
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(decoded.flags.rcode, RCODE_NOT_IMPLEMENTED);
        assert_eq!(decoded.ancount, 0);
        assert_eq!(bytes.len(), query.len());

        let bytes = Response::server_failure(&header, question).to_bytes();
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(decoded.flags.rcode, RCODE_SERVER_FAILURE);
        assert_eq!(decoded.ancount, 0);
    }

    #[test]
    fn display_names() {
        assert_eq!(qtype_name(QTYPE_A), "A");
        assert_eq!(qtype_name(QTYPE_AAAA), "AAAA");
        assert_eq!(qtype_name(255), "???");
        assert_eq!(qclass_name(QCLASS_IN), "IN");
        assert_eq!(rcode_name(RCODE_NOT_IMPLEMENTED), "NOT_IMPLEMENTED");
        assert_eq!(rcode_name(15), "???");
    }
}
