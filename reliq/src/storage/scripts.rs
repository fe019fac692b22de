//! Atomic transition scripts
//!
//! Every multi-key state transition runs as one Lua script, which is the only
//! place the pending/working/delayed/tasks invariants are enforced. Each
//! script reads the server clock once through `TIME`. The bodies live in
//! `lua/` next to this module.
//!
//! Common key layout: the state hash of a task is `KEYS[n] .. ':' .. id`
//! where `KEYS[n]` is the queue's state prefix.

use fred::types::Script;
use once_cell::sync::Lazy;

/// A named Lua script
///
/// Invoked by digest; the body is sent again whenever the server script
/// cache has lost it.
#[derive(Debug)]
pub struct LuaScript {
    name: &'static str,
    body: &'static str,
    script: Script,
}

impl LuaScript {
    fn new(name: &'static str, body: &'static str) -> Self {
        Self {
            name,
            body,
            script: Script::from_lua(body),
        }
    }

    /// Script name, used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Full script body
    pub fn body(&self) -> &'static str {
        self.body
    }

    /// Digest used with `EVALSHA`
    pub fn sha1(&self) -> &str {
        self.script.sha1()
    }

    /// Underlying client script handle
    pub fn script(&self) -> &Script {
        &self.script
    }
}

const ENQUEUE_LUA: &str = include_str!("lua/enqueue.lua");
const DEQUEUE_LUA: &str = include_str!("lua/dequeue.lua");
const REQUEUE_LUA: &str = include_str!("lua/requeue.lua");
const RELEASE_LUA: &str = include_str!("lua/release.lua");
const SWEEP_LUA: &str = include_str!("lua/sweep.lua");
const STATS_LUA: &str = include_str!("lua/stats.lua");

/// Enqueue script
pub static ENQUEUE: Lazy<LuaScript> = Lazy::new(|| LuaScript::new("enqueue", ENQUEUE_LUA));
/// Dequeue script
pub static DEQUEUE: Lazy<LuaScript> = Lazy::new(|| LuaScript::new("dequeue", DEQUEUE_LUA));
/// Requeue script
pub static REQUEUE: Lazy<LuaScript> = Lazy::new(|| LuaScript::new("requeue", REQUEUE_LUA));
/// Release script
pub static RELEASE: Lazy<LuaScript> = Lazy::new(|| LuaScript::new("release", RELEASE_LUA));
/// Sweep script
pub static SWEEP: Lazy<LuaScript> = Lazy::new(|| LuaScript::new("sweep", SWEEP_LUA));
/// Stats script
pub static STATS: Lazy<LuaScript> = Lazy::new(|| LuaScript::new("stats", STATS_LUA));

/// All scripts, for pre-loading
pub fn all() -> [&'static LuaScript; 6] {
    [&ENQUEUE, &DEQUEUE, &REQUEUE, &RELEASE, &SWEEP, &STATS]
}
