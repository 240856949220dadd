use std::collections::HashMap;
use std::sync::RwLock;

use redis::aio::MultiplexedConnection;
use redis::{ErrorKind, FromRedisValue, RedisResult};
use tracing::{debug, warn};

use crate::scripts;

/// Runtime over the shared key/value store's server-side scripts.
///
/// All script texts are loaded at construction and their SHAs cached; every
/// invocation goes through `EVALSHA`. A `NOSCRIPT` reply (script cache flushed,
/// store restarted) triggers exactly one reload-and-retry. The runtime never
/// retries a script for any other reason: script execution is atomic, and a
/// blind retry would run it twice.
pub struct ScriptRuntime {
    client: redis::Client,
    shas: RwLock<HashMap<&'static str, String>>,
}

impl ScriptRuntime {
    pub async fn connect(url: &str) -> RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let runtime = Self { client, shas: RwLock::new(HashMap::new()) };
        runtime.load_all().await?;
        Ok(runtime)
    }

    pub async fn connection(&self) -> RedisResult<MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn load_all(&self) -> RedisResult<()> {
        let mut conn = self.connection().await?;
        for (name, text) in scripts::ALL {
            let sha = Self::script_load(&mut conn, text).await?;
            debug!(script = name, %sha, "loaded seat script");
            self.shas.write().unwrap().insert(name, sha);
        }
        Ok(())
    }

    async fn script_load(conn: &mut MultiplexedConnection, text: &str) -> RedisResult<String> {
        redis::cmd("SCRIPT").arg("LOAD").arg(text).query_async(conn).await
    }

    fn cached_sha(&self, name: &'static str) -> Option<String> {
        self.shas.read().unwrap().get(name).cloned()
    }

    /// Invoke a named script via its cached SHA.
    pub async fn invoke<T: FromRedisValue>(
        &self,
        name: &'static str,
        keys: &[String],
        args: &[String],
    ) -> RedisResult<T> {
        let text = scripts::ALL
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
            .unwrap_or_else(|| panic!("unknown script {name}"));

        let mut conn = self.connection().await?;
        let sha = match self.cached_sha(name) {
            Some(sha) => sha,
            None => {
                let sha = Self::script_load(&mut conn, text).await?;
                self.shas.write().unwrap().insert(name, sha.clone());
                sha
            }
        };

        match Self::evalsha(&mut conn, &sha, keys, args).await {
            Err(err) if err.kind() == ErrorKind::NoScriptError => {
                warn!(script = name, "script missing from store cache, reloading");
                let sha = Self::script_load(&mut conn, text).await?;
                self.shas.write().unwrap().insert(name, sha.clone());
                Self::evalsha(&mut conn, &sha, keys, args).await
            }
            other => other,
        }
    }

    async fn evalsha<T: FromRedisValue>(
        conn: &mut MultiplexedConnection,
        sha: &str,
        keys: &[String],
        args: &[String],
    ) -> RedisResult<T> {
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(sha).arg(keys.len());
        for key in keys {
            cmd.arg(key);
        }
        for arg in args {
            cmd.arg(arg);
        }
        cmd.query_async(conn).await
    }

    /// Seed a seat table in one round trip: every field, the counter, and the
    /// TTL on both keys.
    pub async fn init_table(
        &self,
        seats_key: &str,
        available_key: &str,
        fields: &[(String, String)],
        available: i64,
        ttl_seconds: u64,
    ) -> RedisResult<()> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(seats_key).ignore();
        for (seat_id, record) in fields {
            pipe.hset(seats_key, seat_id, record).ignore();
        }
        pipe.set(available_key, available).ignore();
        pipe.expire(seats_key, ttl_seconds as i64).ignore();
        pipe.expire(available_key, ttl_seconds as i64).ignore();
        pipe.query_async(&mut conn).await
    }
}
