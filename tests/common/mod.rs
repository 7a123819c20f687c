//! Common Test Utilities
//!
//! In-memory collaborators and a harness that wires the real services over
//! them with a manual clock.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use chrono::{DateTime, TimeZone, Utc};
use fake::faker::internet::en::Username;
use fake::Fake;
use parking_lot::Mutex;
use serde_json::Value;
use tower::ServiceExt;

use chat_core::application::services::SyncOutcome;
use chat_core::config::{RateLimitSettings, TagLimitSettings};
use chat_core::domain::{
    member_pairs, DirectChat, DmRepository, FriendEdge, FriendInvitation, FriendRepository,
    GdmRepository, GroupChat, InvitationRepository, MembershipChange, Message, MessageRepository,
    UserDirectory, UserPair,
};
use chat_core::infrastructure::cache::{CounterOp, KvStore};
use chat_core::infrastructure::messaging::{Delivery, EventConsumer, EventPublisher, Publisher};
use chat_core::presentation::http::routes;
use chat_core::presentation::middleware::HttpRateLimit;
use chat_core::shared::clock::{Clock, ManualClock};
use chat_core::shared::error::AppError;
use chat_core::startup::{AppState, Repositories, ServiceConfig, Services, Transports};

// ============================================================================
// Friend graph
// ============================================================================

#[derive(Default)]
pub struct MemoryFriends {
    edges: Mutex<BTreeMap<(String, String), FriendEdge>>,
    offline: Mutex<bool>,
}

impl MemoryFriends {
    /// While offline, edge inserts fail like a lost database connection.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    pub fn edge_count(&self) -> usize {
        self.edges.lock().len()
    }

    pub fn has_edge(&self, userid: &str, friend_id: &str) -> bool {
        self.edges
            .lock()
            .contains_key(&(userid.to_string(), friend_id.to_string()))
    }

    /// Every A->B edge has its B->A mirror.
    pub fn is_mirrored(&self) -> bool {
        let edges = self.edges.lock();
        edges
            .keys()
            .all(|(a, b)| edges.contains_key(&(b.clone(), a.clone())))
    }
}

#[async_trait]
impl FriendRepository for MemoryFriends {
    async fn exists(&self, userid: &str, friend_id: &str) -> Result<bool, AppError> {
        Ok(self.has_edge(userid, friend_id))
    }

    async fn insert_mirrored(&self, edges: [FriendEdge; 2]) -> Result<(), AppError> {
        if *self.offline.lock() {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut stored = self.edges.lock();
        if edges
            .iter()
            .any(|e| stored.contains_key(&(e.userid.clone(), e.friend_id.clone())))
        {
            return Err(AppError::Conflict("friends_pkey".into()));
        }
        for edge in edges {
            stored.insert((edge.userid.clone(), edge.friend_id.clone()), edge);
        }
        Ok(())
    }

    async fn delete_mirrored(&self, userid1: &str, userid2: &str) -> Result<bool, AppError> {
        let mut stored = self.edges.lock();
        let a = stored
            .remove(&(userid1.to_string(), userid2.to_string()))
            .is_some();
        let b = stored
            .remove(&(userid2.to_string(), userid1.to_string()))
            .is_some();
        Ok(a || b)
    }

    async fn list(
        &self,
        userid: &str,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendEdge>, AppError> {
        Ok(self
            .edges
            .lock()
            .values()
            .filter(|e| e.userid == userid)
            .filter(|e| after.is_none_or(|a| e.friend_id.as_str() > a))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn search(
        &self,
        userid: &str,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<FriendEdge>, AppError> {
        let mut found: Vec<FriendEdge> = self
            .edges
            .lock()
            .values()
            .filter(|e| e.userid == userid && e.friend_username.starts_with(prefix))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            (&a.friend_username, &a.friend_id).cmp(&(&b.friend_username, &b.friend_id))
        });
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn filter_friends(
        &self,
        userid: &str,
        candidates: &[String],
    ) -> Result<Vec<String>, AppError> {
        Ok(candidates
            .iter()
            .filter(|c| self.has_edge(userid, c))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryInvitations {
    rows: Mutex<BTreeMap<(String, String), FriendInvitation>>,
}

impl MemoryInvitations {
    pub fn count(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn insert_raw(&self, invitation: FriendInvitation) {
        self.rows.lock().insert(
            (invitation.userid.clone(), invitation.invited_by.clone()),
            invitation,
        );
    }
}

#[async_trait]
impl InvitationRepository for MemoryInvitations {
    async fn find(
        &self,
        userid: &str,
        invited_by: &str,
    ) -> Result<Option<FriendInvitation>, AppError> {
        Ok(self
            .rows
            .lock()
            .get(&(userid.to_string(), invited_by.to_string()))
            .cloned())
    }

    async fn insert(&self, invitation: &FriendInvitation) -> Result<(), AppError> {
        let key = (invitation.userid.clone(), invitation.invited_by.clone());
        let mut rows = self.rows.lock();
        if rows.contains_key(&key) {
            return Err(AppError::Conflict("friend_invitations_pkey".into()));
        }
        rows.insert(key, invitation.clone());
        Ok(())
    }

    async fn delete(&self, userid: &str, invited_by: &str) -> Result<bool, AppError> {
        Ok(self
            .rows
            .lock()
            .remove(&(userid.to_string(), invited_by.to_string()))
            .is_some())
    }

    async fn list_received(
        &self,
        userid: &str,
        since: DateTime<Utc>,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|i| i.userid == userid && i.created_at > since)
            .filter(|i| after.is_none_or(|a| i.invited_by.as_str() > a))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_sent(
        &self,
        invited_by: &str,
        since: DateTime<Utc>,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError> {
        let mut sent: Vec<FriendInvitation> = self
            .rows
            .lock()
            .values()
            .filter(|i| i.invited_by == invited_by && i.created_at > since)
            .filter(|i| after.is_none_or(|a| i.userid.as_str() > a))
            .cloned()
            .collect();
        sent.sort_by(|a, b| a.userid.cmp(&b.userid));
        sent.truncate(limit as usize);
        Ok(sent)
    }

    async fn list_expired(
        &self,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|i| i.created_at <= before)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_involving(
        &self,
        userid: &str,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|i| i.userid == userid || i.invited_by == userid)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    users: Mutex<HashMap<String, String>>,
    deleted: Mutex<BTreeSet<String>>,
}

impl MemoryDirectory {
    pub fn add(&self, userid: &str, username: &str) {
        self.users
            .lock()
            .insert(userid.to_string(), username.to_string());
    }

    /// Delete the account; its relations stay until purged.
    pub fn mark_deleted(&self, userid: &str) {
        self.users.lock().remove(userid);
        self.deleted.lock().insert(userid.to_string());
    }

    pub fn pending(&self) -> usize {
        self.deleted.lock().len()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn usernames(&self, userids: &[String]) -> Result<HashMap<String, String>, AppError> {
        let users = self.users.lock();
        Ok(userids
            .iter()
            .filter_map(|id| users.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }

    async fn pending_purge(&self, limit: i64) -> Result<Vec<String>, AppError> {
        Ok(self
            .deleted
            .lock()
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn complete_purge(&self, userid: &str) -> Result<(), AppError> {
        self.deleted.lock().remove(userid);
        Ok(())
    }
}

// ============================================================================
// Chats and messages
// ============================================================================

#[derive(Default)]
pub struct MemoryDms {
    chats: Mutex<Vec<DirectChat>>,
}

impl MemoryDms {
    pub fn count(&self) -> usize {
        self.chats.lock().len()
    }

    pub fn by_pair(&self, a: &str, b: &str) -> Option<DirectChat> {
        let pair = UserPair::new(a, b);
        self.chats.lock().iter().find(|c| c.pair == pair).cloned()
    }
}

#[async_trait]
impl DmRepository for MemoryDms {
    async fn insert(&self, chat: &DirectChat) -> Result<(), AppError> {
        let mut chats = self.chats.lock();
        if chats
            .iter()
            .any(|c| c.pair == chat.pair || c.chat_id == chat.chat_id)
        {
            return Err(AppError::Conflict("dms_pkey".into()));
        }
        chats.push(chat.clone());
        Ok(())
    }

    async fn find_by_pair(&self, pair: &UserPair) -> Result<Option<DirectChat>, AppError> {
        Ok(self.chats.lock().iter().find(|c| &c.pair == pair).cloned())
    }

    async fn find_by_id(&self, chat_id: &str) -> Result<Option<DirectChat>, AppError> {
        Ok(self
            .chats
            .lock()
            .iter()
            .find(|c| c.chat_id == chat_id)
            .cloned())
    }

    async fn update_props(
        &self,
        chat_id: &str,
        name: &str,
        theme: &Value,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut chats = self.chats.lock();
        match chats.iter_mut().find(|c| c.chat_id == chat_id) {
            Some(chat) => {
                chat.name = name.to_string();
                chat.theme = theme.clone();
                chat.last_updated = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch(&self, chat_id: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut chats = self.chats.lock();
        match chats.iter_mut().find(|c| c.chat_id == chat_id) {
            Some(chat) => {
                chat.last_updated = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn latest(
        &self,
        userid: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<DirectChat>, AppError> {
        let mut chats: Vec<DirectChat> = self
            .chats
            .lock()
            .iter()
            .filter(|c| c.pair.contains(userid))
            .filter(|c| before.is_none_or(|b| c.last_updated < b))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        chats.truncate(limit as usize);
        Ok(chats)
    }

    async fn delete(&self, chat_id: &str) -> Result<bool, AppError> {
        let mut chats = self.chats.lock();
        let before = chats.len();
        chats.retain(|c| c.chat_id != chat_id);
        Ok(chats.len() < before)
    }
}

#[derive(Default)]
struct GdmState {
    chats: HashMap<String, GroupChat>,
    members: HashMap<String, Vec<String>>,
    assoc: BTreeSet<(String, String, String)>,
}

impl GdmState {
    fn rebuild_assoc(&mut self, chat_id: &str) {
        self.assoc.retain(|(c, _, _)| c != chat_id);
        if let Some(members) = self.members.get(chat_id) {
            for (a, b) in member_pairs(members) {
                self.assoc.insert((chat_id.to_string(), a, b));
            }
        }
    }

    fn touch(&mut self, chat_id: &str, now: DateTime<Utc>) {
        if let Some(chat) = self.chats.get_mut(chat_id) {
            chat.last_updated = now;
        }
    }
}

#[derive(Default)]
pub struct MemoryGdms {
    state: Mutex<GdmState>,
}

impl MemoryGdms {
    pub fn exists(&self, chat_id: &str) -> bool {
        self.state.lock().chats.contains_key(chat_id)
    }

    pub fn member_list(&self, chat_id: &str) -> Vec<String> {
        self.state
            .lock()
            .members
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Assoc rows of one chat as (userid_1, userid_2).
    pub fn assoc_of(&self, chat_id: &str) -> BTreeSet<(String, String)> {
        self.state
            .lock()
            .assoc
            .iter()
            .filter(|(c, _, _)| c == chat_id)
            .map(|(_, a, b)| (a.clone(), b.clone()))
            .collect()
    }
}

#[async_trait]
impl GdmRepository for MemoryGdms {
    async fn create(&self, chat: &GroupChat, members: &[String]) -> Result<(), AppError> {
        let mut state = self.state.lock();
        if state.chats.contains_key(&chat.chat_id) {
            return Err(AppError::Conflict("gdms_pkey".into()));
        }
        state.chats.insert(chat.chat_id.clone(), chat.clone());
        state.members.insert(chat.chat_id.clone(), members.to_vec());
        state.rebuild_assoc(&chat.chat_id);
        Ok(())
    }

    async fn find(&self, chat_id: &str) -> Result<Option<GroupChat>, AppError> {
        Ok(self.state.lock().chats.get(chat_id).cloned())
    }

    async fn is_member(&self, chat_id: &str, userid: &str) -> Result<bool, AppError> {
        Ok(self
            .state
            .lock()
            .members
            .get(chat_id)
            .is_some_and(|m| m.iter().any(|u| u == userid)))
    }

    async fn members(&self, chat_id: &str) -> Result<Vec<String>, AppError> {
        Ok(self.member_list(chat_id))
    }

    async fn add_members(
        &self,
        chat_id: &str,
        userids: &[String],
        max: usize,
        now: DateTime<Utc>,
    ) -> Result<MembershipChange, AppError> {
        let mut state = self.state.lock();
        let members = state
            .members
            .get_mut(chat_id)
            .ok_or_else(|| AppError::NotFound(chat_id.to_string()))?;
        if userids.iter().any(|u| members.contains(u)) {
            return Err(AppError::Conflict("gdm_members_pkey".into()));
        }
        let count = members.len();
        if count + userids.len() > max {
            return Ok(MembershipChange::OverCapacity { count });
        }
        members.extend(userids.iter().cloned());
        let count = members.len();
        state.rebuild_assoc(chat_id);
        state.touch(chat_id, now);
        Ok(MembershipChange::Applied { count })
    }

    async fn remove_members(
        &self,
        chat_id: &str,
        userids: &[String],
        min: usize,
        now: DateTime<Utc>,
    ) -> Result<MembershipChange, AppError> {
        let mut state = self.state.lock();
        let members = state
            .members
            .get_mut(chat_id)
            .ok_or_else(|| AppError::NotFound(chat_id.to_string()))?;
        if userids.iter().any(|u| !members.contains(u)) {
            return Err(AppError::NotFound("member".into()));
        }
        let count = members.len();
        if count < min + userids.len() {
            return Ok(MembershipChange::BelowFloor { count });
        }
        members.retain(|m| !userids.contains(m));
        let count = members.len();
        state.rebuild_assoc(chat_id);
        state.touch(chat_id, now);
        Ok(MembershipChange::Applied { count })
    }

    async fn update_props(
        &self,
        chat_id: &str,
        name: &str,
        theme: &Value,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        match state.chats.get_mut(chat_id) {
            Some(chat) => {
                chat.name = name.to_string();
                chat.theme = theme.clone();
                chat.last_updated = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch(&self, chat_id: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        let exists = state.chats.contains_key(chat_id);
        state.touch(chat_id, now);
        Ok(exists)
    }

    async fn latest(
        &self,
        userid: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<GroupChat>, AppError> {
        let state = self.state.lock();
        let mut chats: Vec<GroupChat> = state
            .members
            .iter()
            .filter(|(_, m)| m.iter().any(|u| u == userid))
            .filter_map(|(id, _)| state.chats.get(id))
            .filter(|c| before.is_none_or(|b| c.last_updated < b))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        chats.truncate(limit as usize);
        Ok(chats)
    }

    async fn chats_of(&self, userid: &str, limit: i64) -> Result<Vec<String>, AppError> {
        let mut ids: Vec<String> = self
            .state
            .lock()
            .members
            .iter()
            .filter(|(_, m)| m.iter().any(|u| u == userid))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids.truncate(limit as usize);
        Ok(ids)
    }

    async fn shared(&self, userid: &str, other: &str, limit: i64) -> Result<Vec<String>, AppError> {
        Ok(self
            .state
            .lock()
            .assoc
            .iter()
            .filter(|(_, a, b)| a == userid && b == other)
            .map(|(c, _, _)| c.clone())
            .take(limit as usize)
            .collect())
    }

    async fn delete(&self, chat_id: &str) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        let existed = state.chats.remove(chat_id).is_some();
        state.members.remove(chat_id);
        state.assoc.retain(|(c, _, _)| c != chat_id);
        Ok(existed)
    }
}

#[derive(Default)]
pub struct MemoryMessages {
    rows: Mutex<Vec<Message>>,
}

impl MemoryMessages {
    pub fn count_in(&self, chat_id: &str) -> usize {
        self.rows.lock().iter().filter(|m| m.chat_id == chat_id).count()
    }

    pub fn insert_raw(&self, message: Message) {
        self.rows.lock().push(message);
    }
}

#[async_trait]
impl MessageRepository for MemoryMessages {
    async fn insert(&self, message: &Message) -> Result<(), AppError> {
        self.rows.lock().push(message.clone());
        Ok(())
    }

    async fn find(&self, chat_id: &str, msg_id: i64) -> Result<Option<Message>, AppError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|m| m.chat_id == chat_id && m.msg_id == msg_id)
            .cloned())
    }

    async fn list(
        &self,
        chat_id: &str,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, AppError> {
        let mut rows: Vec<Message> = self
            .rows
            .lock()
            .iter()
            .filter(|m| m.chat_id == chat_id && before.is_none_or(|b| m.msg_id < b))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.msg_id.cmp(&a.msg_id));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn delete(&self, chat_id: &str, msg_id: i64) -> Result<bool, AppError> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|m| !(m.chat_id == chat_id && m.msg_id == msg_id));
        Ok(rows.len() < before)
    }

    async fn delete_all(&self, chat_id: &str) -> Result<u64, AppError> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|m| m.chat_id != chat_id);
        Ok((before - rows.len()) as u64)
    }
}

// ============================================================================
// KV, pub/sub and event streams
// ============================================================================

/// KV store whose TTLs follow the manual clock.
pub struct MemoryKv {
    clock: Arc<ManualClock>,
    values: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    counters: Mutex<HashMap<String, (i64, DateTime<Utc>)>>,
    pub counter_calls: Mutex<usize>,
}

impl MemoryKv {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            values: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            counter_calls: Mutex::new(0),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        self.now() + chrono::Duration::from_std(ttl).unwrap()
    }

    pub fn counter_keys(&self) -> Vec<String> {
        self.counters.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        let expires = self.expiry(ttl);
        self.values
            .lock()
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, AppError> {
        let now = self.now();
        let values = self.values.lock();
        Ok(keys
            .iter()
            .map(|k| {
                values
                    .get(k)
                    .filter(|(_, expires)| *expires > now)
                    .map(|(v, _)| v.clone())
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.values.lock().remove(key).is_some())
    }

    async fn counters(&self, ops: &[CounterOp]) -> Result<Vec<i64>, AppError> {
        *self.counter_calls.lock() += 1;
        let now = self.now();
        let mut counters = self.counters.lock();
        Ok(ops
            .iter()
            .map(|op| match op {
                CounterOp::Incr { key, ttl } => {
                    let expires = self.expiry(*ttl);
                    let entry = counters.entry(key.clone()).or_insert((0, expires));
                    if entry.1 <= now {
                        entry.0 = 0;
                    }
                    entry.0 += 1;
                    entry.1 = expires;
                    entry.0
                }
                CounterOp::Get { key } => counters
                    .get(key)
                    .filter(|(_, expires)| *expires > now)
                    .map(|(v, _)| *v)
                    .unwrap_or(0),
            })
            .collect())
    }
}

/// Publisher that records every message.
#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    failing: Mutex<BTreeSet<String>>,
}

impl RecordingPublisher {
    /// Publishing on `channel` fails from now on.
    pub fn fail_on(&self, channel: &str) {
        self.failing.lock().insert(channel.to_string());
    }

    pub fn channels(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn messages_on(&self, channel: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| c == channel)
            .filter_map(|(_, p)| serde_json::from_slice(p).ok())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), AppError> {
        if self.failing.lock().contains(channel) {
            return Err(AppError::Internal(format!("{} is unreachable", channel)));
        }
        self.sent
            .lock()
            .push((channel.to_string(), payload.to_vec()));
        Ok(())
    }
}

/// In-memory event stream: entries stay until acknowledged and every
/// fetch hands out all unacknowledged entries again.
#[derive(Default)]
pub struct MemoryEventBus {
    entries: Mutex<VecDeque<Delivery>>,
    next_id: Mutex<u64>,
    acked: Mutex<Vec<String>>,
}

impl MemoryEventBus {
    pub fn pending(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn acked(&self) -> usize {
        self.acked.lock().len()
    }

    pub fn push_raw(&self, key: &str, payload: &[u8]) {
        let mut next = self.next_id.lock();
        *next += 1;
        self.entries.lock().push_back(Delivery {
            stream: "events.friends.0".into(),
            id: format!("{}-0", *next),
            key: key.to_string(),
            payload: payload.to_vec(),
            attempt: 0,
        });
    }

    /// Apply every pending event once, acknowledging the ones that succeed.
    pub async fn deliver_all(
        &self,
        synchronizer: &chat_core::application::services::EventSynchronizer,
    ) -> Vec<SyncOutcome> {
        let batch: Vec<Delivery> = self.entries.lock().iter().cloned().collect();
        let mut outcomes = Vec::new();
        for delivery in batch {
            if let Ok(outcome) = synchronizer.handle(&delivery.payload).await {
                self.ack_id(&delivery.id);
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    fn ack_id(&self, id: &str) {
        self.entries.lock().retain(|d| d.id != id);
        self.acked.lock().push(id.to_string());
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, _subject: &str, key: &str, payload: &[u8]) -> Result<(), AppError> {
        self.push_raw(key, payload);
        Ok(())
    }
}

/// Consumer over a shared [`MemoryEventBus`].
pub struct MemoryConsumer(pub Arc<MemoryEventBus>);

#[async_trait]
impl EventConsumer for MemoryConsumer {
    async fn fetch(&mut self) -> Result<Vec<Delivery>, AppError> {
        let batch: Vec<Delivery> = {
            let mut entries = self.0.entries.lock();
            entries
                .iter_mut()
                .map(|d| {
                    d.attempt += 1;
                    d.clone()
                })
                .collect()
        };
        if batch.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(batch)
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), AppError> {
        self.0.ack_id(&delivery.id);
        Ok(())
    }
}

/// Event publisher that always fails.
pub struct BrokenEvents;

#[async_trait]
impl EventPublisher for BrokenEvents {
    async fn publish(&self, _: &str, _: &str, _: &[u8]) -> Result<(), AppError> {
        Err(AppError::Internal("stream unavailable".into()))
    }
}

/// Event publisher that records, for each event, whether the pair was
/// still friends at the moment it was published.
#[derive(Default)]
pub struct EdgeWitness {
    friends: Mutex<Option<Arc<MemoryFriends>>>,
    seen: Mutex<Vec<(String, bool)>>,
}

impl EdgeWitness {
    pub fn watch(&self, friends: Arc<MemoryFriends>) {
        *self.friends.lock() = Some(friends);
    }

    /// `(kind, edges present)` per published event, in order.
    pub fn seen(&self) -> Vec<(String, bool)> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl EventPublisher for EdgeWitness {
    async fn publish(&self, _: &str, _: &str, payload: &[u8]) -> Result<(), AppError> {
        let event: Value = serde_json::from_slice(payload)?;
        let payload = &event["payload"];
        let a = payload["userid"].as_str().unwrap_or_default();
        let b = payload["other"]
            .as_str()
            .or_else(|| payload["invited_by"].as_str())
            .unwrap_or_default();
        let linked = self
            .friends
            .lock()
            .as_ref()
            .is_some_and(|f| f.has_edge(a, b) && f.has_edge(b, a));
        let kind = event["kind"].as_str().unwrap_or_default().to_string();
        self.seen.lock().push((kind, linked));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub friends: Arc<MemoryFriends>,
    pub invitations: Arc<MemoryInvitations>,
    pub directory: Arc<MemoryDirectory>,
    pub dms: Arc<MemoryDms>,
    pub gdms: Arc<MemoryGdms>,
    pub messages: Arc<MemoryMessages>,
    pub kv: Arc<MemoryKv>,
    pub publisher: Arc<RecordingPublisher>,
    pub bus: Arc<MemoryEventBus>,
    pub services: Services,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Harness whose friend events go to `events` instead of the bus.
    pub fn with_events(events: Arc<dyn EventPublisher>) -> Self {
        Self::build(Some(events))
    }

    fn build(events: Option<Arc<dyn EventPublisher>>) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let friends = Arc::new(MemoryFriends::default());
        let invitations = Arc::new(MemoryInvitations::default());
        let directory = Arc::new(MemoryDirectory::default());
        let dms = Arc::new(MemoryDms::default());
        let gdms = Arc::new(MemoryGdms::default());
        let messages = Arc::new(MemoryMessages::default());
        let kv = Arc::new(MemoryKv::new(clock.clone()));
        let publisher = Arc::new(RecordingPublisher::default());
        let bus = Arc::new(MemoryEventBus::default());

        let services = Services::build(
            Repositories {
                friends: friends.clone(),
                invitations: invitations.clone(),
                directory: directory.clone(),
                dms: dms.clone(),
                gdms: gdms.clone(),
                messages: messages.clone(),
            },
            Transports {
                kv: kv.clone(),
                publisher: publisher.clone(),
                events: events.unwrap_or_else(|| bus.clone()),
            },
            clock.clone(),
            &ServiceConfig {
                fanout_timeout: Duration::from_secs(2),
                ..ServiceConfig::default()
            },
        );

        Self {
            clock,
            friends,
            invitations,
            directory,
            dms,
            gdms,
            messages,
            kv,
            publisher,
            bus,
            services,
        }
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }

    /// Register users under generated usernames.
    pub fn add_users(&self, ids: &[&str]) {
        for id in ids {
            let name: String = Username().fake();
            self.directory.add(id, &format!("{}_{}", name, id));
        }
    }

    /// Friend edges without the invitation flow or its event.
    pub async fn link(&self, a: &str, b: &str) {
        let now = self.clock.now();
        let edge = |from: &str, to: &str| FriendEdge {
            userid: from.to_string(),
            friend_id: to.to_string(),
            friend_username: format!("name_{}", to),
            created_at: now,
        };
        self.friends
            .insert_mirrored([edge(a, b), edge(b, a)])
            .await
            .unwrap();
    }

    /// Invite, accept and apply the resulting event.
    pub async fn befriend(&self, a: &str, b: &str) {
        self.services.friends.invite_friend(b, a).await.unwrap();
        self.services.friends.accept_invitation(b, a).await.unwrap();
        self.sync().await;
    }

    /// Register both users, befriend them and return the direct chat the
    /// synchronizer created for the pair.
    pub async fn direct_chat(&self, a: &str, b: &str) -> DirectChat {
        for id in [a, b] {
            self.directory.add(id, &format!("name_{}", id));
        }
        self.befriend(a, b).await;
        self.dms.by_pair(a, b).unwrap()
    }

    /// Apply every pending friend event.
    pub async fn sync(&self) -> Vec<SyncOutcome> {
        self.bus.deliver_all(&self.services.synchronizer).await
    }

    pub fn state(&self, rate_limit: &RateLimitSettings) -> AppState {
        AppState {
            presence: self.services.presence.clone(),
            fanout: self.services.fanout.clone(),
            rate_limit: HttpRateLimit::new(self.services.rate_limiter.clone(), rate_limit),
            probes: Arc::new(Vec::new()),
        }
    }

    pub fn router(&self, rate_limit: &RateLimitSettings) -> Router {
        routes::create_router(self.state(rate_limit))
    }
}

pub fn tag_limit(limit: i64) -> TagLimitSettings {
    TagLimitSettings {
        limit,
        period_secs: 10,
        expiration_secs: 20,
    }
}

pub fn rate_limits(ip: i64, user: i64, user_ip: i64) -> RateLimitSettings {
    RateLimitSettings {
        ip: tag_limit(ip),
        user: tag_limit(user),
        user_ip: tag_limit(user_ip),
    }
}

/// Poll `check` until it holds or a second passes. Fanout runs detached.
pub async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Test application over a router
pub struct TestApp {
    pub router: Router,
}

impl TestApp {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Make a GET request to the application
    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// POST a JSON body, optionally as an authenticated user
    pub async fn post_json(
        &self,
        uri: &str,
        userid: Option<&str>,
        body: &str,
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "198.51.100.4");
        if let Some(userid) = userid {
            builder = builder.header("x-user-id", userid);
        }

        self.router
            .clone()
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }
}
