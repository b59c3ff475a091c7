//! Query classification: the decision point between answering from the
//! table, rejecting the record type, and relaying upstream.
//!
//! A datagram moves through a validation gate first; anything structurally
//! wrong is dropped without a response. Validated queries are classified
//! against the match table and either answered directly or handed to the
//! forwarder. The server loop performs the actual I/O.

use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::{debug, info};

use crate::dns::{
    self, DecodeError, HEADER_LEN, Header, MIN_QUERY_LEN, QCLASS_IN, QTYPE_A, Question, Response,
};
use crate::table::MatchTable;

/// What the server loop should do with an inbound datagram.
pub enum QueryAction {
    /// Reply bytes ready to send back to the requester.
    Respond {
        response: Vec<u8>,
        outcome: Outcome,
    },
    /// Relay the raw datagram to the upstream resolver. The decoded header
    /// and question are kept for failure synthesis and logging.
    Forward { header: Header, question: Question },
    /// Validation failed; no outbound packet at all.
    Drop,
}

/// Terminal classification of a directly-answered query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Resolved,
    NotImplemented,
}

/// Why a datagram was dropped at the validation gate.
#[derive(Debug, Error)]
enum Reject {
    #[error("{0}")]
    Malformed(#[from] DecodeError),
    #[error("response bit set on a query")]
    NotAQuery,
    #[error("unsupported question count {0}")]
    QuestionCount(u16),
}

/// Resolver decides what happens to each query.
///
/// Holds the read-only match table and the answer TTL; it owns no sockets
/// and no per-request state.
pub struct Resolver {
    table: MatchTable,
    ttl: u32,
}

impl Resolver {
    pub fn new(table: MatchTable, ttl: u32) -> Self {
        Self { table, ttl }
    }

    /// Number of names servable from the table.
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    /// Validate and classify one datagram.
    ///
    /// Malformed input never produces a response: the packet is dropped
    /// with a diagnostic and the listener moves on.
    pub fn process_query(&self, datagram: &[u8]) -> QueryAction {
        let (header, question) = match validate(datagram) {
            Ok(parts) => parts,
            Err(reason) => {
                debug!(len = datagram.len(), %reason, "dropped malformed packet");
                return QueryAction::Drop;
            }
        };

        let qtype = dns::qtype_name(question.qtype);
        let qclass = dns::qclass_name(question.qclass);

        match self.table.lookup(&question.name) {
            // A name we serve, but not a record type we implement.
            Some(_) if question.qtype != QTYPE_A || question.qclass != QCLASS_IN => {
                info!(
                    id = header.id,
                    name = %question.name,
                    qtype,
                    qclass,
                    outcome = "not_implemented",
                    "query"
                );
                QueryAction::Respond {
                    response: Response::not_implemented(&header, question).to_bytes(),
                    outcome: Outcome::NotImplemented,
                }
            }
            Some(addrs) => {
                info!(
                    id = header.id,
                    name = %question.name,
                    qtype,
                    qclass,
                    records = %format_addrs(addrs),
                    ttl = self.ttl,
                    outcome = "resolved",
                    "query"
                );
                QueryAction::Respond {
                    response: Response::answer(&header, question, addrs, self.ttl).to_bytes(),
                    outcome: Outcome::Resolved,
                }
            }
            None => {
                info!(
                    id = header.id,
                    name = %question.name,
                    qtype,
                    qclass,
                    outcome = "forwarded",
                    "query"
                );
                QueryAction::Forward { header, question }
            }
        }
    }
}

/// The validation gate, checks in order:
/// datagram holds a header, the response bit is clear, exactly one
/// question, room for a non-empty question, and the question decodes.
fn validate(datagram: &[u8]) -> Result<(Header, Question), Reject> {
    if datagram.len() < HEADER_LEN {
        return Err(DecodeError::Truncated(datagram.len()).into());
    }

    let header = Header::decode(datagram)?;
    if header.flags.response {
        return Err(Reject::NotAQuery);
    }
    if header.qdcount != 1 {
        return Err(Reject::QuestionCount(header.qdcount));
    }
    if datagram.len() < MIN_QUERY_LEN {
        return Err(DecodeError::Truncated(datagram.len()).into());
    }

    let question = Question::decode(datagram)?;
    Ok((header, question))
}

fn format_addrs(addrs: &[Ipv4Addr]) -> String {
    addrs
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
