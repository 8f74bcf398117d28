//! In-memory session store.
//!
//! The single source of truth for conversation state. Sessions are keyed by
//! the caller-supplied id, created lazily on the first append, and removed
//! either explicitly (`clear_history`) or by the eviction sweep once idle for
//! longer than the retention window.
//!
//! Sessions live in a sharded `DashMap`. Every mutation of a session happens
//! while holding that entry's shard guard, so appends to one session are
//! serialized while unrelated sessions proceed independently. No lock is ever
//! held across an `.await`; the store API is entirely synchronous.
//!
//! A turn that will append an exchange later (after a model call, say) first
//! takes a [`TurnReservation`]. Reservations count against the per-session
//! ceiling together with the stored user messages, so concurrent turns for
//! one session cannot overshoot it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use parley_types::chat::{ChatMessage, MessageRole, SessionInfo, StoreStats};
use parley_types::error::ChatError;

use super::clock::{Clock, SystemClock};

/// State for one conversation.
#[derive(Debug, Clone)]
struct SessionEntry {
    messages: Vec<ChatMessage>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    /// Turns admitted but not yet committed or released.
    reserved: usize,
}

impl SessionEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            messages: Vec::new(),
            created_at: now,
            last_activity: now,
            reserved: 0,
        }
    }

    fn user_messages(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count()
    }

    /// Timestamps never go backwards within a session, even if the clock does.
    fn stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.max(self.last_activity)
    }

    fn push(&mut self, role: MessageRole, content: String, now: DateTime<Utc>) {
        let timestamp = self.stamp(now);
        self.messages.push(ChatMessage {
            role,
            content,
            timestamp,
        });
        self.last_activity = timestamp;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = self.stamp(now);
    }
}

/// Authoritative registry of live chat sessions.
///
/// Constructed explicitly and shared by `Arc` handle; independent instances
/// never see each other's sessions.
pub struct SessionStore {
    sessions: DashMap<String, SessionEntry>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Create a store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
        }
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Append one message, creating the session if it does not exist.
    ///
    /// User messages must have non-blank content. Role strings coming from
    /// outside are parsed with `MessageRole::from_str`, which rejects anything
    /// but `user` and `assistant` with [`ChatError::InvalidInput`].
    pub fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Result<(), ChatError> {
        let content = content.into();
        validate_session_id(session_id)?;
        if role == MessageRole::User {
            validate_user_content(&content)?;
        }

        let now = self.clock.now();
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry::new(now));
        entry.push(role, content, now);

        debug!(
            session_id,
            %role,
            total = entry.messages.len(),
            "Message added to session"
        );
        Ok(())
    }

    /// Append a user message and its reply as two adjacent messages.
    ///
    /// Both are written under the same entry guard: a concurrent append to the
    /// same session lands before or after the pair, never between them, and
    /// either both messages are stored or neither is.
    pub fn append_exchange(
        &self,
        session_id: &str,
        user_message: &str,
        reply: &str,
    ) -> Result<(), ChatError> {
        validate_session_id(session_id)?;
        validate_user_content(user_message)?;
        self.push_exchange(session_id, user_message, reply, false);
        Ok(())
    }

    /// Admit one more turn for `session_id` unless the stored user messages
    /// plus the turns already in flight reach `ceiling`.
    ///
    /// Returns `Ok(None)` at the ceiling. The check and the increment happen
    /// under the session's entry guard. Dropping the reservation without
    /// committing it frees the slot again.
    pub fn try_reserve_turn(
        &self,
        session_id: &str,
        ceiling: usize,
    ) -> Result<Option<TurnReservation<'_>>, ChatError> {
        validate_session_id(session_id)?;
        if ceiling == 0 {
            return Ok(None);
        }

        let now = self.clock.now();
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry::new(now));

        let used = entry.user_messages() + entry.reserved;
        if used >= ceiling {
            debug!(session_id, used, ceiling, "Turn refused at session ceiling");
            return Ok(None);
        }
        entry.reserved += 1;
        entry.touch(now);

        Ok(Some(TurnReservation {
            store: self,
            session_id: session_id.to_string(),
            settled: false,
        }))
    }

    fn push_exchange(&self, session_id: &str, user_message: &str, reply: &str, reserved: bool) {
        let now = self.clock.now();
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry::new(now));
        entry.push(MessageRole::User, user_message.to_string(), now);
        entry.push(MessageRole::Assistant, reply.to_string(), now);
        if reserved {
            entry.reserved = entry.reserved.saturating_sub(1);
        }

        debug!(
            session_id,
            total = entry.messages.len(),
            "Exchange added to session"
        );
    }

    /// Give back an uncommitted slot. A session that only ever held
    /// reservations disappears with its last one.
    fn release_turn(&self, session_id: &str) {
        let removed = self
            .sessions
            .remove_if(session_id, |_, entry| {
                entry.messages.is_empty() && entry.reserved <= 1
            })
            .is_some();
        if removed {
            return;
        }
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.reserved = entry.reserved.saturating_sub(1);
        }
    }

    /// Ordered snapshot of a session's messages.
    ///
    /// Unknown ids yield an empty vector and do not create a session. A hit
    /// counts as activity and pushes back eviction.
    pub fn get_history(&self, session_id: &str) -> Vec<ChatMessage> {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) => {
                entry.touch(self.clock.now());
                entry.messages.clone()
            }
            None => Vec::new(),
        }
    }

    /// Remove a session. Returns whether it existed; calling twice is fine.
    pub fn clear_history(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!(session_id, "Session cleared");
        }
        removed
    }

    /// Evict every session idle for longer than `max_age` as of `now`.
    /// Sessions with a turn in flight are kept.
    ///
    /// Shards are locked one at a time, so appends and reads on sessions in
    /// other shards are never blocked for the whole sweep.
    pub fn sweep_expired(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> usize {
        let mut evicted = 0;
        self.sessions.retain(|_, entry| {
            let keep = entry.reserved > 0 || now - entry.last_activity <= max_age;
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            info!(evicted, remaining = self.sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// [`sweep_expired`](Self::sweep_expired) against the store's own clock.
    pub fn sweep(&self, max_age: chrono::Duration) -> usize {
        self.sweep_expired(self.clock.now(), max_age)
    }

    /// Metadata for one session, without touching its activity time.
    pub fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        let now = self.clock.now();
        self.sessions.get(session_id).map(|entry| SessionInfo {
            message_count: entry.messages.len(),
            created_at: entry.created_at,
            last_activity: entry.last_activity,
            age_ms: (now - entry.created_at).num_milliseconds().max(0),
        })
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Aggregate counts for observability. Read-only.
    pub fn stats(&self) -> StoreStats {
        let now = self.clock.now();
        let mut stats = StoreStats::default();
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;

        for entry in self.sessions.iter() {
            stats.active_sessions += 1;
            stats.total_messages += entry.messages.len();
            let created = entry.created_at;
            oldest = Some(oldest.map_or(created, |o| o.min(created)));
            newest = Some(newest.map_or(created, |n| n.max(created)));
        }

        let age_ms = |t: DateTime<Utc>| (now - t).num_milliseconds().max(0);
        stats.oldest_age_ms = oldest.map_or(0, age_ms);
        stats.newest_age_ms = newest.map_or(0, age_ms);
        stats
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

/// A slot under a session's message ceiling, held while a turn is produced.
///
/// [`commit`](Self::commit) stores the exchange and consumes the slot.
/// Dropping the reservation instead releases it.
#[must_use = "dropping a reservation releases the turn immediately"]
pub struct TurnReservation<'a> {
    store: &'a SessionStore,
    session_id: String,
    settled: bool,
}

impl TurnReservation<'_> {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append the user message and its reply as one exchange.
    ///
    /// A blank `user_message` is rejected and the slot is released.
    pub fn commit(mut self, user_message: &str, reply: &str) -> Result<(), ChatError> {
        validate_user_content(user_message)?;
        self.settled = true;
        self.store
            .push_exchange(&self.session_id, user_message, reply, true);
        Ok(())
    }
}

impl Drop for TurnReservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.store.release_turn(&self.session_id);
        }
    }
}

impl std::fmt::Debug for TurnReservation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnReservation")
            .field("session_id", &self.session_id)
            .field("settled", &self.settled)
            .finish()
    }
}

fn validate_session_id(session_id: &str) -> Result<(), ChatError> {
    if session_id.trim().is_empty() {
        return Err(ChatError::InvalidInput("Session ID is required".to_string()));
    }
    Ok(())
}

fn validate_user_content(content: &str) -> Result<(), ChatError> {
    if content.trim().is_empty() {
        return Err(ChatError::InvalidInput("Message is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::clock::ManualClock;

    fn manual_store() -> (Arc<ManualClock>, SessionStore) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = SessionStore::with_clock(clock.clone());
        (clock, store)
    }

    #[test]
    fn add_then_get_returns_single_message() {
        let store = SessionStore::new();
        store
            .add_message("s1", MessageRole::User, "hello there")
            .unwrap();

        let history = store.get_history("s1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "hello there");
    }

    #[test]
    fn second_add_appends() {
        let store = SessionStore::new();
        store.add_message("s1", MessageRole::User, "first").unwrap();
        store
            .add_message("s1", MessageRole::Assistant, "second")
            .unwrap();

        let history = store.get_history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "second");
    }

    #[test]
    fn get_history_unknown_id_creates_nothing() {
        let store = SessionStore::new();
        assert!(store.get_history("ghost").is_empty());
        assert_eq!(store.stats().active_sessions, 0);
        assert!(store.session_info("ghost").is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let store = SessionStore::new();
        store.add_message("s1", MessageRole::User, "hi").unwrap();

        assert!(store.clear_history("s1"));
        assert!(store.get_history("s1").is_empty());
        assert!(!store.clear_history("s1"));
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn rejects_blank_user_content_and_missing_id() {
        let store = SessionStore::new();
        assert!(matches!(
            store.add_message("s1", MessageRole::User, "   "),
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            store.add_message("", MessageRole::User, "hi"),
            Err(ChatError::InvalidInput(_))
        ));
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn unrecognised_role_string_is_invalid_input() {
        let err = "moderator".parse::<MessageRole>().unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }

    #[test]
    fn empty_assistant_content_is_allowed() {
        let store = SessionStore::new();
        store.add_message("s1", MessageRole::Assistant, "").unwrap();
        assert_eq!(store.get_history("s1").len(), 1);
    }

    #[test]
    fn append_exchange_writes_pair_in_order() {
        let store = SessionStore::new();
        store.append_exchange("s1", "question", "answer").unwrap();

        let history = store.get_history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "question");
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(history[1].content, "answer");
    }

    #[test]
    fn append_exchange_rejects_blank_user_message_atomically() {
        let store = SessionStore::new();
        assert!(store.append_exchange("s1", " ", "answer").is_err());
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn timestamps_never_decrease_when_clock_goes_back() {
        let (clock, store) = manual_store();
        store.add_message("s1", MessageRole::User, "one").unwrap();
        clock.advance(chrono::Duration::seconds(-30));
        store.add_message("s1", MessageRole::User, "two").unwrap();

        let history = store.get_history("s1");
        assert!(history[1].timestamp >= history[0].timestamp);
    }

    #[test]
    fn sweep_evicts_idle_session_and_keeps_active_one() {
        let (clock, store) = manual_store();
        store.add_message("idle", MessageRole::User, "hello").unwrap();

        clock.advance(chrono::Duration::hours(20));
        store.add_message("active", MessageRole::User, "hello").unwrap();

        let now = clock.now() + chrono::Duration::hours(5);
        // idle: 25h since last activity, active: 5h
        let evicted = store.sweep_expired(now, chrono::Duration::hours(24));
        assert_eq!(evicted, 1);
        assert!(store.get_history("idle").is_empty());
        assert_eq!(store.get_history("active").len(), 1);
    }

    #[test]
    fn reading_counts_as_activity() {
        let (clock, store) = manual_store();
        store.add_message("s1", MessageRole::User, "hello").unwrap();

        clock.advance(chrono::Duration::hours(23));
        assert_eq!(store.get_history("s1").len(), 1);

        clock.advance(chrono::Duration::hours(2));
        assert_eq!(store.sweep(chrono::Duration::hours(24)), 0);
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn session_info_does_not_refresh_activity() {
        let (clock, store) = manual_store();
        store.add_message("s1", MessageRole::User, "hello").unwrap();
        clock.advance(chrono::Duration::hours(25));

        let info = store.session_info("s1").unwrap();
        assert_eq!(info.message_count, 1);
        assert_eq!(info.age_ms, chrono::Duration::hours(25).num_milliseconds());

        assert_eq!(store.sweep(chrono::Duration::hours(24)), 1);
    }

    #[test]
    fn stats_aggregate_sessions() {
        let (clock, store) = manual_store();
        assert_eq!(store.stats(), StoreStats::default());

        store.append_exchange("a", "q", "a").unwrap();
        clock.advance(chrono::Duration::minutes(10));
        store.add_message("b", MessageRole::User, "hi").unwrap();
        clock.advance(chrono::Duration::minutes(5));

        let stats = store.stats();
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(
            stats.oldest_age_ms,
            chrono::Duration::minutes(15).num_milliseconds()
        );
        assert_eq!(
            stats.newest_age_ms,
            chrono::Duration::minutes(5).num_milliseconds()
        );
    }

    #[test]
    fn independent_instances_do_not_share_state() {
        let a = SessionStore::new();
        let b = SessionStore::new();
        a.add_message("s1", MessageRole::User, "hi").unwrap();
        assert!(b.get_history("s1").is_empty());
    }

    #[test]
    fn concurrent_adds_to_same_session_lose_nothing() {
        let store = Arc::new(SessionStore::new());
        let writers = 8;
        let per_writer = 200;

        std::thread::scope(|scope| {
            for w in 0..writers {
                let store = store.clone();
                scope.spawn(move || {
                    for i in 0..per_writer {
                        store
                            .add_message("shared", MessageRole::User, format!("{w}:{i}"))
                            .unwrap();
                    }
                });
            }
        });

        let history = store.get_history("shared");
        assert_eq!(history.len(), writers * per_writer);

        // Each writer's messages appear in the order it sent them.
        for w in 0..writers {
            let seen: Vec<usize> = history
                .iter()
                .filter_map(|m| {
                    let (writer, index) = m.content.split_once(':')?;
                    if writer.parse::<usize>().ok()? != w {
                        return None;
                    }
                    index.parse::<usize>().ok()
                })
                .collect();
            assert_eq!(seen, (0..per_writer).collect::<Vec<_>>());
        }

        assert!(history.windows(2).all(|p| p[0].timestamp <= p[1].timestamp));
    }

    #[test]
    fn concurrent_exchanges_stay_paired() {
        let store = Arc::new(SessionStore::new());

        std::thread::scope(|scope| {
            for w in 0..4 {
                let store = store.clone();
                scope.spawn(move || {
                    for i in 0..100 {
                        let q = format!("q{w}-{i}");
                        let a = format!("a{w}-{i}");
                        store.append_exchange("shared", &q, &a).unwrap();
                    }
                });
            }
        });

        let history = store.get_history("shared");
        assert_eq!(history.len(), 800);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, MessageRole::User);
            assert_eq!(pair[1].role, MessageRole::Assistant);
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }

    #[test]
    fn reservations_count_toward_ceiling() {
        let store = SessionStore::new();
        store.append_exchange("s1", "q", "a").unwrap();

        let first = store.try_reserve_turn("s1", 3).unwrap().unwrap();
        let second = store.try_reserve_turn("s1", 3).unwrap().unwrap();
        assert!(store.try_reserve_turn("s1", 3).unwrap().is_none());

        drop(first);
        let third = store.try_reserve_turn("s1", 3).unwrap();
        assert!(third.is_some());
        drop(second);
        drop(third);
    }

    #[test]
    fn commit_stores_exchange_and_keeps_slot_used() {
        let store = SessionStore::new();
        let turn = store.try_reserve_turn("s1", 2).unwrap().unwrap();
        assert_eq!(turn.session_id(), "s1");
        turn.commit("question", "answer").unwrap();

        let history = store.get_history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "answer");

        let turn = store.try_reserve_turn("s1", 2).unwrap().unwrap();
        turn.commit("again", "ok").unwrap();
        assert!(store.try_reserve_turn("s1", 2).unwrap().is_none());
    }

    #[test]
    fn released_reservation_leaves_no_session_behind() {
        let store = SessionStore::new();
        let turn = store.try_reserve_turn("s1", 5).unwrap().unwrap();
        assert_eq!(store.session_count(), 1);

        drop(turn);
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn blank_commit_releases_the_slot() {
        let store = SessionStore::new();
        let turn = store.try_reserve_turn("s1", 1).unwrap().unwrap();
        assert!(matches!(turn.commit("  ", "reply"), Err(ChatError::InvalidInput(_))));

        assert_eq!(store.session_count(), 0);
        assert!(store.try_reserve_turn("s1", 1).unwrap().is_some());
    }

    #[test]
    fn zero_ceiling_refuses_without_creating_session() {
        let store = SessionStore::new();
        assert!(store.try_reserve_turn("s1", 0).unwrap().is_none());
        assert_eq!(store.session_count(), 0);
        assert!(matches!(
            store.try_reserve_turn(" ", 5),
            Err(ChatError::InvalidInput(_))
        ));
    }

    #[test]
    fn sweep_keeps_sessions_with_turn_in_flight() {
        let (clock, store) = manual_store();
        store.append_exchange("s1", "q", "a").unwrap();
        let turn = store.try_reserve_turn("s1", 10).unwrap().unwrap();

        clock.advance(chrono::Duration::hours(30));
        assert_eq!(store.sweep(chrono::Duration::hours(24)), 0);

        turn.commit("late", "reply").unwrap();
        assert_eq!(store.get_history("s1").len(), 4);
    }

    #[test]
    fn concurrent_reservations_never_exceed_ceiling() {
        let store = Arc::new(SessionStore::new());
        let ceiling = 25;

        std::thread::scope(|scope| {
            for w in 0..8 {
                let store = store.clone();
                scope.spawn(move || {
                    for i in 0..20 {
                        if let Some(turn) = store.try_reserve_turn("shared", ceiling).unwrap() {
                            turn.commit(&format!("q{w}-{i}"), "a").unwrap();
                        }
                    }
                });
            }
        });

        let user_messages = store
            .get_history("shared")
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count();
        assert_eq!(user_messages, ceiling);
    }
}
