//! In-memory transport doubles
//!
//! Each double is a cheap handle over shared state, so a test can keep one
//! clone for inspection while the `Orchestrator` owns another. Nothing is
//! ever delivered automatically: the test decides when an acknowledgement,
//! timeout or query response arrives.

use crate::ibc::messages::{Coin, IcaMsg, PacketId};
use crate::ibc::transport::{IbcTransport, QueryTransport, RateLimitGuard, TransportError};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// What a packet carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketPayload {
    IcaTx {
        connection_id: String,
        owner: String,
        msgs: Vec<IcaMsg>,
    },
    Transfer {
        sender: String,
        receiver: String,
        token: Coin,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub packet_id: PacketId,
    pub payload: PacketPayload,
    pub timeout: u64,
}

impl SentPacket {
    /// Messages of an ICA packet, empty for transfers
    pub fn msgs(&self) -> &[IcaMsg] {
        match &self.payload {
            PacketPayload::IcaTx { msgs, .. } => msgs,
            PacketPayload::Transfer { .. } => &[],
        }
    }
}

#[derive(Debug, Default)]
struct IbcState {
    next_sequence: u64,
    ica_channels: BTreeMap<String, String>,
    sent: Vec<SentPacket>,
    reject_next: Option<String>,
}

/// Records every submission and hands out sequential packet ids
#[derive(Debug, Clone, Default)]
pub struct MockIbcTransport {
    state: Rc<RefCell<IbcState>>,
}

impl MockIbcTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentPacket> {
        self.state.borrow().sent.clone()
    }

    pub fn last_sent(&self) -> Option<SentPacket> {
        self.state.borrow().sent.last().cloned()
    }

    /// ICA packets submitted on behalf of `owner`
    pub fn sent_by_owner(&self, owner: &str) -> Vec<SentPacket> {
        self.state
            .borrow()
            .sent
            .iter()
            .filter(|p| matches!(&p.payload, PacketPayload::IcaTx { owner: o, .. } if o == owner))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.state.borrow_mut().sent.clear();
    }

    /// Make the next submission fail synchronously
    pub fn reject_next(&self, reason: &str) {
        self.state.borrow_mut().reject_next = Some(reason.to_string());
    }

    fn next_packet(&self, port_id: String, channel_id: String) -> PacketId {
        let mut state = self.state.borrow_mut();
        state.next_sequence += 1;
        PacketId {
            port_id,
            channel_id,
            sequence: state.next_sequence,
        }
    }

    fn take_rejection(&self) -> Option<String> {
        self.state.borrow_mut().reject_next.take()
    }
}

impl IbcTransport for MockIbcTransport {
    fn submit_ica_tx(
        &mut self,
        connection_id: &str,
        owner: &str,
        msgs: Vec<IcaMsg>,
        timeout: u64,
    ) -> Result<PacketId, TransportError> {
        if let Some(reason) = self.take_rejection() {
            return Err(TransportError::IcaRejected(reason));
        }
        let channel_id = {
            let mut state = self.state.borrow_mut();
            let next_index = state.ica_channels.len();
            state
                .ica_channels
                .entry(owner.to_string())
                .or_insert_with(|| format!("channel-ica-{}", next_index))
                .clone()
        };
        let packet_id = self.next_packet(format!("icacontroller-{}", owner), channel_id);
        self.state.borrow_mut().sent.push(SentPacket {
            packet_id: packet_id.clone(),
            payload: PacketPayload::IcaTx {
                connection_id: connection_id.to_string(),
                owner: owner.to_string(),
                msgs,
            },
            timeout,
        });
        Ok(packet_id)
    }

    fn send_transfer(
        &mut self,
        channel_id: &str,
        sender: &str,
        receiver: &str,
        token: Coin,
        timeout: u64,
    ) -> Result<PacketId, TransportError> {
        if let Some(reason) = self.take_rejection() {
            return Err(TransportError::TransferRejected(reason));
        }
        let packet_id = self.next_packet("transfer".to_string(), channel_id.to_string());
        self.state.borrow_mut().sent.push(SentPacket {
            packet_id: packet_id.clone(),
            payload: PacketPayload::Transfer {
                sender: sender.to_string(),
                receiver: receiver.to_string(),
                token,
            },
            timeout,
        });
        Ok(packet_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedQuery {
    pub query_id: String,
    pub connection_id: String,
    pub path: String,
    pub request: Vec<u8>,
    pub timeout: u64,
}

#[derive(Debug, Default)]
struct QueryState {
    submitted: Vec<SubmittedQuery>,
    reject_next: Option<String>,
}

/// Records queries; ids are a SHA-256 over the request and a counter
#[derive(Debug, Clone, Default)]
pub struct MockQueryTransport {
    state: Rc<RefCell<QueryState>>,
}

impl MockQueryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<SubmittedQuery> {
        self.state.borrow().submitted.clone()
    }

    pub fn last_submitted(&self) -> Option<SubmittedQuery> {
        self.state.borrow().submitted.last().cloned()
    }

    pub fn clear(&self) {
        self.state.borrow_mut().submitted.clear();
    }

    pub fn reject_next(&self, reason: &str) {
        self.state.borrow_mut().reject_next = Some(reason.to_string());
    }
}

impl QueryTransport for MockQueryTransport {
    fn submit_query(
        &mut self,
        connection_id: &str,
        path: &str,
        request: Vec<u8>,
        timeout: u64,
    ) -> Result<String, TransportError> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = state.reject_next.take() {
            return Err(TransportError::QueryRejected(reason));
        }

        let mut hasher = Sha256::new();
        hasher.update(connection_id.as_bytes());
        hasher.update(path.as_bytes());
        hasher.update(&request);
        hasher.update(state.submitted.len().to_be_bytes());
        let query_id = format!("{:x}", hasher.finalize());

        state.submitted.push(SubmittedQuery {
            query_id: query_id.clone(),
            connection_id: connection_id.to_string(),
            path: path.to_string(),
            request,
            timeout,
        });
        Ok(query_id)
    }
}

/// Per-channel transfer quotas; channels without a quota are unlimited
#[derive(Debug, Clone, Default)]
pub struct StaticRateLimits {
    quotas: Rc<RefCell<BTreeMap<String, u128>>>,
}

impl StaticRateLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_quota(&self, channel_id: &str, max_amount: u128) {
        self.quotas
            .borrow_mut()
            .insert(channel_id.to_string(), max_amount);
    }
}

impl RateLimitGuard for StaticRateLimits {
    fn check_transfer(
        &self,
        channel_id: &str,
        denom: &str,
        amount: u128,
    ) -> Result<(), TransportError> {
        match self.quotas.borrow().get(channel_id) {
            Some(max) if amount > *max => Err(TransportError::RateLimited {
                channel_id: channel_id.to_string(),
                denom: denom.to_string(),
                amount,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_increase_and_clones_share_state() {
        let observer = MockIbcTransport::new();
        let mut transport = observer.clone();
        let first = transport
            .submit_ica_tx("connection-0", "c.DELEGATION", vec![], 10)
            .unwrap();
        let second = transport
            .send_transfer("channel-0", "a", "b", Coin::new("uatom", 1), 10)
            .unwrap();
        assert!(second.sequence > first.sequence);
        assert_eq!(observer.sent().len(), 2);
        assert_eq!(observer.sent_by_owner("c.DELEGATION").len(), 1);
    }

    #[test]
    fn test_rejection_applies_once() {
        let mut transport = MockIbcTransport::new();
        transport.reject_next("channel closed");
        assert!(transport
            .submit_ica_tx("connection-0", "c.FEE", vec![], 10)
            .is_err());
        assert!(transport
            .submit_ica_tx("connection-0", "c.FEE", vec![], 10)
            .is_ok());
    }

    #[test]
    fn test_query_ids_are_unique() {
        let mut queries = MockQueryTransport::new();
        let a = queries.submit_query("connection-0", "p", vec![1], 5).unwrap();
        let b = queries.submit_query("connection-0", "p", vec![1], 5).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_rate_limit_quota() {
        let limits = StaticRateLimits::new();
        limits.set_quota("channel-0", 100);
        assert!(limits.check_transfer("channel-0", "uatom", 100).is_ok());
        assert!(limits.check_transfer("channel-0", "uatom", 101).is_err());
        assert!(limits.check_transfer("channel-9", "uatom", 10_000).is_ok());
    }
}
