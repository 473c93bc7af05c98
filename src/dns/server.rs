//! Authoritative DNS Responder
//!
//! Answers A queries for the served pseudo-TLD over UDP. Every reply
//! is authoritative with TTL 0, and names without an address get an
//! empty NOERROR reply rather than a name error, so resolvers treat
//! the zone as existing even when a name is missing.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::api::Metrics;
use crate::config::Config;
use crate::dns::handler::{QueryHandler, CLASS_IN, TYPE_A};
use crate::names::NameTable;

/// DNS packet constants
const DNS_HEADER_SIZE: usize = 12;
const DNS_MAX_PACKET_SIZE: usize = 512;

/// DNS flags
const FLAG_QR: u16 = 0x8000; // Query/Response
const FLAG_AA: u16 = 0x0400; // Authoritative Answer
const FLAG_RD: u16 = 0x0100; // Recursion Desired

/// Answers always carry TTL 0 so nothing caches them
const ANSWER_TTL: u32 = 0;

/// Wire size of one answer: name pointer, type, class, TTL, rdlength, IPv4
const A_RECORD_SIZE: usize = 16;

/// Run the DNS responder
pub async fn run_dns_server(
    config: Arc<Config>,
    table: Arc<RwLock<NameTable>>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.dns_listen, config.dns_port);
    let socket = Arc::new(UdpSocket::bind(addr).await?);

    info!("🌐 DNS responder listening on {} (zone .{})", addr, config.zone);

    let handler = Arc::new(QueryHandler::new(table));

    loop {
        let mut buf = [0u8; DNS_MAX_PACKET_SIZE];
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => {
                let request = buf[..len].to_vec();
                let handler = handler.clone();
                let socket = socket.clone();
                let metrics = metrics.clone();

                tokio::spawn(async move {
                    handle_dns_query(socket.as_ref(), src, &request, &handler, &metrics).await;
                });
            }
            Err(e) => {
                error!("DNS socket error: {}", e);
            }
        }
    }
}

/// Handle a single DNS query
async fn handle_dns_query(
    socket: &UdpSocket,
    src: SocketAddr,
    request: &[u8],
    handler: &QueryHandler,
    metrics: &Metrics,
) {
    metrics.inc_dns_queries();

    let (response, answers) = match answer_query(request, handler).await {
        Ok(reply) => reply,
        Err(e) => {
            metrics.inc_dns_malformed();
            debug!("dropping malformed packet from {}: {}", src, e);
            return;
        }
    };

    if answers == 0 {
        metrics.inc_dns_empty_replies();
    } else {
        metrics.add_dns_answers(answers as u64);
    }

    // A failed write leaves the query unanswered; the client retries
    if let Err(e) = socket.send_to(&response, src).await {
        metrics.inc_dns_send_failures();
        warn!("DNS reply to {} failed: {}", src, e);
    }
}

/// Resolve a parsed query into a full reply packet
///
/// Returns the packet and the number of answer records in it. Fails
/// only for packets that cannot be parsed; those get no reply at all.
async fn answer_query(
    request: &[u8],
    handler: &QueryHandler,
) -> anyhow::Result<(Vec<u8>, usize)> {
    let (questions, question_end) = parse_questions(request)?;

    let mut answers = Vec::new();
    for question in &questions {
        if let Some(address) = handler
            .resolve(&question.name, question.qtype, question.qclass)
            .await
        {
            answers.push((question.name_offset, address));
        }
    }

    // Keep the reply inside a single unfragmented datagram
    let capacity = (DNS_MAX_PACKET_SIZE - question_end) / A_RECORD_SIZE;
    answers.truncate(capacity);

    let response = build_response(request, question_end, &answers);

    Ok((response, answers.len()))
}

/// A parsed question plus the offset of its name in the packet
#[derive(Debug)]
struct Question {
    name: String,
    qtype: u16,
    qclass: u16,
    name_offset: usize,
}

/// Parse the question section of a query packet
fn parse_questions(packet: &[u8]) -> anyhow::Result<(Vec<Question>, usize)> {
    if packet.len() < DNS_HEADER_SIZE {
        anyhow::bail!("packet shorter than DNS header");
    }

    let qdcount = u16::from_be_bytes([packet[4], packet[5]]) as usize;
    let mut questions = Vec::with_capacity(qdcount.min(8));
    let mut offset = DNS_HEADER_SIZE;

    for _ in 0..qdcount {
        let (question, next) = parse_question(packet, offset)?;
        questions.push(question);
        offset = next;
    }

    Ok((questions, offset))
}

/// Parse a single question starting at `offset`
fn parse_question(packet: &[u8], offset: usize) -> anyhow::Result<(Question, usize)> {
    let name_offset = offset;
    let mut name_parts = Vec::new();
    let mut offset = offset;

    // Parse name labels
    loop {
        if offset >= packet.len() {
            anyhow::bail!("truncated question");
        }

        let len = packet[offset] as usize;
        if len == 0 {
            offset += 1;
            break;
        }

        // Compression pointers are not accepted in question names
        if len > 63 {
            anyhow::bail!("invalid label length {}", len);
        }

        offset += 1;
        if offset + len > packet.len() {
            anyhow::bail!("truncated label");
        }

        let label = std::str::from_utf8(&packet[offset..offset + len])?;
        name_parts.push(label.to_lowercase());
        offset += len;
    }

    if offset + 4 > packet.len() {
        anyhow::bail!("truncated question");
    }

    let qtype = u16::from_be_bytes([packet[offset], packet[offset + 1]]);
    let qclass = u16::from_be_bytes([packet[offset + 2], packet[offset + 3]]);
    offset += 4;

    let question = Question {
        name: name_parts.join("."),
        qtype,
        qclass,
        name_offset,
    };

    Ok((question, offset))
}

/// Build a response packet for a parsed query
///
/// The question section is echoed byte for byte, so answer records can
/// point back into it with compression pointers and the caller sees
/// its own spelling of each name.
fn build_response(
    request: &[u8],
    question_end: usize,
    answers: &[(usize, Ipv4Addr)],
) -> Vec<u8> {
    let mut response = Vec::with_capacity(question_end + answers.len() * A_RECORD_SIZE);

    let request_flags = u16::from_be_bytes([request[2], request[3]]);
    let flags = FLAG_QR | FLAG_AA | (request_flags & FLAG_RD);

    // Header: echo id and question count, RCODE stays NOERROR
    response.extend_from_slice(&request[0..2]);
    response.extend_from_slice(&flags.to_be_bytes());
    response.extend_from_slice(&request[4..6]);
    response.extend_from_slice(&(answers.len() as u16).to_be_bytes());
    response.extend_from_slice(&0u16.to_be_bytes()); // nscount
    response.extend_from_slice(&0u16.to_be_bytes()); // arcount

    // Question section, echoed verbatim
    response.extend_from_slice(&request[DNS_HEADER_SIZE..question_end]);

    // Answer section
    for (name_offset, address) in answers {
        let name_ptr = 0xC000u16 | (*name_offset as u16);

        response.extend_from_slice(&name_ptr.to_be_bytes());
        response.extend_from_slice(&TYPE_A.to_be_bytes());
        response.extend_from_slice(&CLASS_IN.to_be_bytes());
        response.extend_from_slice(&ANSWER_TTL.to_be_bytes());
        response.extend_from_slice(&4u16.to_be_bytes()); // rdlength
        response.extend_from_slice(&address.octets());
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NameRecord;

    const TYPE_AAAA: u16 = 28;

    fn build_query(id: u16, flags: u16, name: &str, qtype: u16, qclass: u16) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&id.to_be_bytes());
        packet.extend_from_slice(&flags.to_be_bytes());
        packet.extend_from_slice(&1u16.to_be_bytes()); // qdcount
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes());

        for label in name.split('.').filter(|l| !l.is_empty()) {
            packet.push(label.len() as u8);
            packet.extend_from_slice(label.as_bytes());
        }
        packet.push(0);

        packet.extend_from_slice(&qtype.to_be_bytes());
        packet.extend_from_slice(&qclass.to_be_bytes());
        packet
    }

    fn example_handler() -> QueryHandler {
        let records = vec![NameRecord {
            name: "example.p2p.".to_string(),
            address: Ipv4Addr::new(127, 0, 0, 1),
        }];
        let table = NameTable::new("p2p", &records, None);
        QueryHandler::new(Arc::new(RwLock::new(table)))
    }

    #[test]
    fn test_parse_question() {
        let packet = build_query(0x1234, 0, "example.p2p", TYPE_A, CLASS_IN);

        let (questions, end) = parse_questions(&packet).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].name, "example.p2p");
        assert_eq!(questions[0].qtype, TYPE_A);
        assert_eq!(questions[0].qclass, CLASS_IN);
        assert_eq!(questions[0].name_offset, DNS_HEADER_SIZE);
        assert_eq!(end, packet.len());
    }

    #[test]
    fn test_parse_multiple_questions() {
        let mut packet = build_query(0x1234, 0, "a.p2p", TYPE_A, CLASS_IN);
        packet[5] = 2; // qdcount
        let second = build_query(0, 0, "b.p2p", TYPE_A, CLASS_IN);
        packet.extend_from_slice(&second[DNS_HEADER_SIZE..]);

        let (questions, end) = parse_questions(&packet).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].name, "a.p2p");
        assert_eq!(questions[1].name, "b.p2p");
        assert_eq!(questions[1].name_offset, 23);
        assert_eq!(end, packet.len());
    }

    #[test]
    fn test_parse_rejects_short_packet() {
        assert!(parse_questions(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_parse_rejects_long_label() {
        let mut packet = vec![0u8; DNS_HEADER_SIZE];
        packet[5] = 1; // qdcount
        packet.push(64); // label length past the limit
        packet.extend_from_slice(&[b'a'; 64]);

        assert!(parse_questions(&packet).is_err());
    }

    #[test]
    fn test_parse_rejects_truncated_name() {
        let mut packet = vec![0u8; DNS_HEADER_SIZE];
        packet[5] = 1; // qdcount
        packet.push(3);
        packet.extend_from_slice(b"abc"); // no terminator, no type/class

        assert!(parse_questions(&packet).is_err());
    }

    #[tokio::test]
    async fn test_known_name_gets_single_answer() {
        let handler = example_handler();
        let request = build_query(0x1234, FLAG_RD, "example.p2p", TYPE_A, CLASS_IN);

        let (response, answers) = answer_query(&request, &handler).await.unwrap();

        assert_eq!(answers, 1);
        // id echoed, QR|AA set, RD echoed, RCODE NOERROR
        assert_eq!(&response[0..2], &[0x12, 0x34]);
        assert_eq!(&response[2..4], &[0x85, 0x00]);
        assert_eq!(u16::from_be_bytes([response[6], response[7]]), 1);
        // question echoed verbatim
        assert_eq!(&response[DNS_HEADER_SIZE..29], &request[DNS_HEADER_SIZE..29]);
        // answer: pointer to the question name, A/IN, TTL 0, 127.0.0.1
        assert_eq!(&response[29..31], &[0xC0, 0x0C]);
        assert_eq!(&response[35..39], &[0, 0, 0, 0]);
        assert_eq!(&response[41..45], &[127, 0, 0, 1]);
        assert_eq!(response.len(), 45);
    }

    #[tokio::test]
    async fn test_unknown_name_gets_empty_authoritative_reply() {
        let handler = example_handler();
        let request = build_query(0x4242, 0, "other.p2p", TYPE_A, CLASS_IN);

        let (response, answers) = answer_query(&request, &handler).await.unwrap();

        assert_eq!(answers, 0);
        // QR|AA, no RD, RCODE NOERROR rather than NXDOMAIN
        assert_eq!(&response[2..4], &[0x84, 0x00]);
        assert_eq!(u16::from_be_bytes([response[6], response[7]]), 0);
        assert_eq!(response.len(), request.len());
    }

    #[tokio::test]
    async fn test_non_address_type_gets_no_answer() {
        let handler = example_handler();
        let request = build_query(1, 0, "example.p2p", TYPE_AAAA, CLASS_IN);

        let (_, answers) = answer_query(&request, &handler).await.unwrap();
        assert_eq!(answers, 0);
    }

    #[tokio::test]
    async fn test_lookup_ignores_case_but_echo_preserves_it() {
        let handler = example_handler();
        let request = build_query(7, 0, "Example.P2P", TYPE_A, CLASS_IN);

        let (response, answers) = answer_query(&request, &handler).await.unwrap();

        assert_eq!(answers, 1);
        assert_eq!(&response[13..20], b"Example");
    }

    #[tokio::test]
    async fn test_wildcard_answers_unlisted_in_zone_names() {
        let wildcard = Ipv4Addr::new(127, 1, 1, 153);
        let table = NameTable::new("p2p", &[], Some(wildcard));
        let handler = QueryHandler::new(Arc::new(RwLock::new(table)));

        let request = build_query(9, 0, "anything.p2p", TYPE_A, CLASS_IN);
        let (response, answers) = answer_query(&request, &handler).await.unwrap();
        assert_eq!(answers, 1);
        let rdata_start = response.len() - 4;
        assert_eq!(&response[rdata_start..], &[127, 1, 1, 153]);

        // Out-of-zone names never hit the wildcard
        let request = build_query(9, 0, "example.com", TYPE_A, CLASS_IN);
        let (_, answers) = answer_query(&request, &handler).await.unwrap();
        assert_eq!(answers, 0);
    }

    #[tokio::test]
    async fn test_multi_question_query_answers_each_hit() {
        let handler = example_handler();

        let mut request = build_query(3, 0, "example.p2p", TYPE_A, CLASS_IN);
        request[5] = 2; // qdcount
        let second = build_query(0, 0, "missing.p2p", TYPE_A, CLASS_IN);
        request.extend_from_slice(&second[DNS_HEADER_SIZE..]);

        let (response, answers) = answer_query(&request, &handler).await.unwrap();

        assert_eq!(answers, 1);
        assert_eq!(u16::from_be_bytes([response[4], response[5]]), 2);
        assert_eq!(u16::from_be_bytes([response[6], response[7]]), 1);
    }
}
