//! 会话与闪存
//!
//! 会话数据本身只是一个 [`InputMap`]，`_flash` 键下保存留给下一个请求的一次性数据。
//! 请求开始时 [`Session::take_flash`] 取走上一个请求写入的闪存，错误查询都基于这份数据。

use crate::constants::{
    CSRF_SESSION_EXPIRED, CSRF_SESSION_KEY, CSRF_TOKEN_MISMATCH, ERRORS_KEY, FLASH_SESSION_KEY,
    OLD_ARRAY_KEY,
};
use crate::error::HttpFailure;
use crate::input::InputMap;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// 会话存储后端
pub trait SessionStore: Send + Sync {
    fn load(&self, id: &str) -> Option<InputMap>;

    fn save(&self, id: &str, data: InputMap);

    fn destroy(&self, id: &str);
}

/// 默认会话有效期（秒）
pub const DEFAULT_SESSION_LIFETIME: u64 = 1440;

#[derive(Debug)]
struct StoredSession {
    data: InputMap,
    accessed: Instant,
}

/// 进程内存储
///
/// 超过有效期未访问的会话在读取时失效，并在保存时按间隔批量清理。
/// 保存空数据等同于销毁。
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
    lifetime: Duration,
    last_pruned: Mutex<Instant>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_lifetime(Duration::from_secs(DEFAULT_SESSION_LIFETIME))
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lifetime,
            last_pruned: Mutex::new(Instant::now()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// 清理所有过期会话
    pub fn prune(&self) {
        let lifetime = self.lifetime;
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, stored| stored.accessed.elapsed() <= lifetime);
        if sessions.len() < before {
            tracing::debug!(removed = before - sessions.len(), "Pruned expired sessions");
        }
    }

    fn prune_if_due(&self) {
        let mut last = self.last_pruned.lock();
        if last.elapsed() >= self.lifetime / 4 {
            *last = Instant::now();
            drop(last);
            self.prune();
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: &str) -> Option<InputMap> {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(id) {
            Some(stored) if stored.accessed.elapsed() <= self.lifetime => {
                stored.accessed = Instant::now();
                Some(stored.data.clone())
            }
            Some(_) => {
                sessions.remove(id);
                None
            }
            None => None,
        }
    }

    fn save(&self, id: &str, data: InputMap) {
        if data.is_empty() {
            self.destroy(id);
        } else {
            let stored = StoredSession {
                data,
                accessed: Instant::now(),
            };
            self.sessions.write().insert(id.to_string(), stored);
        }
        self.prune_if_due();
    }

    fn destroy(&self, id: &str) {
        self.sessions.write().remove(id);
    }
}

/// 单个请求持有的会话句柄
#[derive(Debug, Clone, Default)]
pub struct Session {
    id: String,
    data: InputMap,
    /// 上一个请求写入、尚未取走的闪存
    pending: InputMap,
    /// 本次请求已取走的闪存
    previous: InputMap,
    /// 留给下一个请求的闪存
    next: InputMap,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_data(id, InputMap::new())
    }

    /// 新会话，随机 ID
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn with_data(id: impl Into<String>, mut data: InputMap) -> Self {
        let pending = match data.shift_remove(FLASH_SESSION_KEY) {
            Some(Value::Object(map)) => map,
            _ => InputMap::new(),
        };
        Self {
            id: id.into(),
            data,
            pending,
            previous: InputMap::new(),
            next: InputMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &InputMap {
        &self.data
    }

    /// 持久化用的数据，未取走的闪存与新写入的闪存一起保留
    pub fn into_data(self) -> InputMap {
        let mut data = self.data;
        let mut flash = self.pending;
        crate::input::merge(&mut flash, self.next);
        if !flash.is_empty() {
            data.insert(FLASH_SESSION_KEY.to_string(), Value::Object(flash));
        }
        data
    }

    // ==================== 普通数据 ====================

    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.shift_remove(key)
    }

    /// 清空所有数据，包括闪存
    pub fn flush(&mut self) {
        self.data.clear();
        self.pending.clear();
        self.previous.clear();
        self.next.clear();
    }

    // ==================== 闪存 ====================

    /// 写入下一个请求可见的一次性数据
    pub fn flash(&mut self, key: impl Into<String>, value: Value) {
        self.next.insert(key.into(), value);
    }

    /// 记录验证错误
    pub fn add_error(&mut self, key: &str, code: i32, message: &str) {
        let errors = self
            .next
            .entry(ERRORS_KEY)
            .or_insert_with(|| Value::Object(InputMap::new()));
        if !errors.is_object() {
            *errors = Value::Object(InputMap::new());
        }
        if let Value::Object(errors) = errors {
            errors.insert(key.to_string(), json!({"code": code, "message": message}));
        }
    }

    /// 把输入保存为旧输入，`except` 中的键不保存
    pub fn flash_input(&mut self, input: &InputMap, except: &[&str]) {
        let old: InputMap = input
            .iter()
            .filter(|(key, _)| !except.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.next.insert(OLD_ARRAY_KEY.to_string(), Value::Object(old));
    }

    /// 取走上一个请求写入的闪存，只能取一次
    pub fn take_flash(&mut self) -> InputMap {
        self.previous = std::mem::take(&mut self.pending);
        self.previous.clone()
    }

    // ==================== 错误查询 ====================

    pub fn errors(&self) -> Option<&InputMap> {
        self.previous.get(ERRORS_KEY).and_then(Value::as_object)
    }

    pub fn error(&self, key: &str) -> Option<&Value> {
        self.errors()?.get(key)
    }

    pub fn error_message(&self, key: &str) -> Option<&str> {
        self.error(key)?.get("message")?.as_str()
    }

    pub fn error_code(&self, key: &str) -> Option<i64> {
        self.error(key)?.get("code")?.as_i64()
    }

    pub fn has_error(&self, key: &str) -> bool {
        self.error(key).is_some()
    }

    pub fn has_errors(&self) -> bool {
        self.errors().map(|errors| !errors.is_empty()).unwrap_or(false)
    }

    // ==================== CSRF ====================

    /// 生成新的 CSRF 令牌，会话中只保存它的 SHA-256 摘要
    pub fn csrf_token(&mut self) -> String {
        let token = hex::encode(rand::thread_rng().gen::<[u8; 16]>());
        self.data
            .insert(CSRF_SESSION_KEY.to_string(), Value::String(csrf_digest(&token)));
        token
    }

    /// 校验请求提交的令牌
    pub fn verify_csrf(&self, token: Option<&str>) -> Result<(), HttpFailure> {
        let token = token.ok_or_else(|| {
            HttpFailure::bad_request("CSRF token was not found on the request parameter.")
        })?;

        let Some(Value::String(expected)) = self.data.get(CSRF_SESSION_KEY) else {
            return Err(HttpFailure::validation(
                CSRF_SESSION_EXPIRED,
                "Your session has expired.",
            ));
        };

        if bool::from(expected.as_bytes().ct_eq(csrf_digest(token).as_bytes())) {
            Ok(())
        } else {
            Err(HttpFailure::validation(CSRF_TOKEN_MISMATCH, "Invalid CSRF token"))
        }
    }
}

fn csrf_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
