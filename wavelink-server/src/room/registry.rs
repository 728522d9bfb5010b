use crate::room::{PeerSession, SessionEvent};
use crate::signaling::OutboundPublisher;
use crate::transport::{MediaEngine, TransportEventSink};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wavelink_core::MemberId;

/// Owns every live peer session, keyed by member id.
///
/// The only place sessions are created or destroyed. Each insert, lookup
/// and removal is atomic on its own. Removal never waits on the media
/// engine: the session is unmapped and marked `Closed` on the spot, and its
/// connection is released on a background task that `close_all` joins.
#[derive(Clone)]
pub struct PeerRegistry {
    sessions: Arc<DashMap<MemberId, Arc<PeerSession>>>,
    releasing: Arc<DashMap<u64, JoinHandle<()>>>,
    next_epoch: Arc<AtomicU64>,
    engine: Arc<dyn MediaEngine>,
    publisher: OutboundPublisher,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl PeerRegistry {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        publisher: OutboundPublisher,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            releasing: Arc::new(DashMap::new()),
            next_epoch: Arc::new(AtomicU64::new(1)),
            engine,
            publisher,
            events_tx,
        }
    }

    /// Returns the live session for `member`, creating it first if needed.
    pub fn get_or_create(&self, member: &MemberId) -> Arc<PeerSession> {
        if let Some(session) = self.sessions.get(member) {
            return session.value().clone();
        }

        self.sessions
            .entry(member.clone())
            .or_insert_with(|| {
                let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
                info!("Creating session for {} (epoch {})", member, epoch);

                let events = TransportEventSink::new(member.clone(), epoch, self.events_tx.clone());
                Arc::new(PeerSession::spawn(
                    member.clone(),
                    epoch,
                    self.engine.clone(),
                    self.publisher.clone(),
                    events,
                ))
            })
            .value()
            .clone()
    }

    pub fn get(&self, member: &MemberId) -> Option<Arc<PeerSession>> {
        self.sessions.get(member).map(|entry| entry.value().clone())
    }

    /// Forgets the session for `member` and closes it. Returns whether there
    /// was one.
    pub fn remove(&self, member: &MemberId) -> bool {
        let Some((_, session)) = self.sessions.remove(member) else {
            debug!("No session to remove for {}", member);
            return false;
        };
        info!("Removed session for {}", member);
        self.retire(session);
        true
    }

    /// Like `remove`, but only if the live session is the given generation.
    pub fn remove_if_current(&self, member: &MemberId, epoch: u64) -> bool {
        let Some((_, session)) = self
            .sessions
            .remove_if(member, |_, session| session.epoch() == epoch)
        else {
            return false;
        };
        info!("Removed session for {} (epoch {})", member, epoch);
        self.retire(session);
        true
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.sessions.contains_key(member)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn members(&self) -> Vec<MemberId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Removes and closes every session concurrently, and waits for
    /// releases still running from earlier removals.
    pub async fn close_all(&self) {
        let sessions: Vec<_> = self
            .members()
            .into_iter()
            .filter_map(|member| self.sessions.remove(&member).map(|(_, session)| session))
            .collect();

        if !sessions.is_empty() {
            info!("Closing {} session(s)", sessions.len());
        }
        join_all(sessions.iter().map(|session| session.close())).await;

        let epochs: Vec<u64> = self.releasing.iter().map(|entry| *entry.key()).collect();
        let pending: Vec<_> = epochs
            .into_iter()
            .filter_map(|epoch| self.releasing.remove(&epoch).map(|(_, handle)| handle))
            .collect();
        for result in join_all(pending).await {
            if let Err(e) = result {
                warn!("Connection release task failed: {}", e);
            }
        }
    }

    fn retire(&self, session: Arc<PeerSession>) {
        session.mark_closed();

        self.releasing.retain(|_, handle| !handle.is_finished());
        let epoch = session.epoch();
        let handle = tokio::spawn(async move {
            session.close().await;
        });
        self.releasing.insert(epoch, handle);
    }
}
