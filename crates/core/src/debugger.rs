//! Debugging facilities.
//!
//! - **Register Viewer**: named dump of the register file
//! - **Watchpoints**: trigger on committed or discarded bus writes at a
//!   given address
//!
//! Watchpoints are checked by [`crate::Peripheral`] whenever the decoder
//! finishes a frame and at least one watchpoint exists.

use crate::peripherals::{Discard, Register, RegisterFile};

/// Watchpoint trigger type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatchKind {
    /// Write accepted by the register file
    Commit,
    /// Write or read to this address dropped by the decoder
    Discard,
    /// Either of the above
    Any,
}

/// A bus-address watchpoint.
#[derive(Debug, Clone)]
pub struct Watchpoint {
    /// 7-bit bus address to watch
    pub addr: u8,
    /// Trigger condition
    pub kind: WatchKind,
    /// Optional: only trigger when the written value equals this
    pub value_match: Option<u8>,
    /// Hit count
    pub hits: u64,
    /// Enabled
    pub enabled: bool,
}

/// Watchpoint trigger event.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchHit {
    /// Watchpoint index
    pub index: usize,
    pub addr: u8,
    /// Register value before the commit (0 for discards)
    pub old_val: u8,
    /// Value carried by the frame
    pub new_val: u8,
    /// What happened to the frame
    pub access: WatchKind,
    /// Core tick of the event
    pub tick: u64,
}

/// Debugger state.
pub struct Debugger {
    /// Active watchpoints
    pub watchpoints: Vec<Watchpoint>,
    /// First unconsumed hit
    pub watch_hit: Option<WatchHit>,
}

impl Debugger {
    pub fn new() -> Self {
        Debugger {
            watchpoints: Vec::new(),
            watch_hit: None,
        }
    }

    /// True if any watchpoint is set.
    pub fn active(&self) -> bool {
        !self.watchpoints.is_empty()
    }

    /// Add a watchpoint. Returns its index.
    pub fn add_watchpoint(&mut self, addr: u8, kind: WatchKind) -> usize {
        let idx = self.watchpoints.len();
        self.watchpoints.push(Watchpoint {
            addr: addr & 0x7F, kind, value_match: None, hits: 0, enabled: true,
        });
        idx
    }

    /// Check watchpoints for a committed register write.
    pub fn check_commit(&mut self, addr: u8, old_val: u8, new_val: u8, tick: u64) {
        self.check(addr, old_val, new_val, WatchKind::Commit, tick);
    }

    /// Check watchpoints for a discarded frame. Truncated frames carry no
    /// address and never trigger.
    pub fn check_discard(&mut self, discard: &Discard, tick: u64) {
        match *discard {
            Discard::Read { addr } => self.check(addr, 0, 0, WatchKind::Discard, tick),
            Discard::UnknownAddress { addr, data } => {
                self.check(addr, 0, data, WatchKind::Discard, tick)
            }
            Discard::Truncated { .. } => {}
        }
    }

    fn check(&mut self, addr: u8, old_val: u8, new_val: u8, access: WatchKind, tick: u64) {
        for (i, wp) in self.watchpoints.iter_mut().enumerate() {
            if !wp.enabled || wp.addr != addr { continue; }
            if wp.kind != WatchKind::Any && wp.kind != access { continue; }
            if let Some(v) = wp.value_match {
                if new_val != v { continue; }
            }
            wp.hits += 1;
            if self.watch_hit.is_none() {
                self.watch_hit = Some(WatchHit { index: i, addr, old_val, new_val, access, tick });
            }
        }
    }

    /// Take pending watchpoint hit (returns and clears it).
    pub fn take_hit(&mut self) -> Option<WatchHit> {
        self.watch_hit.take()
    }

    /// Format watchpoints list.
    pub fn list_watchpoints(&self) -> String {
        if self.watchpoints.is_empty() { return "No watchpoints set.\n".into(); }
        let mut s = String::new();
        for (i, wp) in self.watchpoints.iter().enumerate() {
            let k = match wp.kind {
                WatchKind::Commit => "C",
                WatchKind::Discard => "D",
                WatchKind::Any => "CD",
            };
            let en = if wp.enabled { " " } else { "!" };
            let vm = if let Some(v) = wp.value_match {
                format!(" =0x{:02X}", v)
            } else { String::new() };
            s.push_str(&format!("  [{}]{} 0x{:02X} {:<8} {}  hits={}{}\n",
                i, en, wp.addr, reg_name(wp.addr).unwrap_or("-"), k, wp.hits, vm));
        }
        s
    }
}

impl Default for Debugger {
    fn default() -> Self { Self::new() }
}

// ─── Register Viewer ────────────────────────────────────────────────────────

/// Resolve a bus address to its register name (if backed).
pub fn reg_name(addr: u8) -> Option<&'static str> {
    Register::from_addr(addr).map(Register::name)
}

/// Format the register file with names, hex and binary values.
pub fn dump_registers(regs: &RegisterFile) -> String {
    let mut s = String::new();
    for reg in Register::ALL {
        let val = regs.read(reg);
        s.push_str(&format!("  {:>8} (0x{:02X}) = 0x{:02X}  {:08b}\n", reg.name(), reg.addr(), val, val));
    }
    s
}

/// Format a diff view showing only registers that differ.
pub fn dump_registers_diff(old: &RegisterFile, new: &RegisterFile) -> String {
    let mut s = String::new();
    for reg in Register::ALL {
        let (a, b) = (old.read(reg), new.read(reg));
        if a != b {
            s.push_str(&format!("  {:>8} (0x{:02X}): {:02X} → {:02X}\n", reg.name(), reg.addr(), a, b));
        }
    }
    if s.is_empty() { s.push_str("  (no changes)\n"); }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_registers() {
        let mut regs = RegisterFile::new();
        regs.set(Register::PwmDuty, 0x80);
        let dump = dump_registers(&regs);
        assert!(dump.contains("DUTY (0x04) = 0x80  10000000"));
        assert!(dump.contains("EN_OUT (0x00) = 0x00"));
    }

    #[test]
    fn test_dump_diff() {
        let old = RegisterFile::new();
        let mut new = old.clone();
        assert!(dump_registers_diff(&old, &new).contains("no changes"));
        new.set(Register::DirectOutput, 0xCC);
        let d = dump_registers_diff(&old, &new);
        assert!(d.contains("DIRECT (0x01): 00 → CC"));
    }

    #[test]
    fn test_commit_watchpoint() {
        let mut dbg = Debugger::new();
        dbg.add_watchpoint(0x04, WatchKind::Commit);
        dbg.check_commit(0x01, 0x00, 0xFF, 10);
        assert!(dbg.take_hit().is_none());
        dbg.check_commit(0x04, 0x00, 0x80, 11);
        let hit = dbg.take_hit().unwrap();
        assert_eq!(hit.addr, 0x04);
        assert_eq!(hit.new_val, 0x80);
        assert_eq!(hit.tick, 11);
        assert_eq!(dbg.watchpoints[0].hits, 1);
    }

    #[test]
    fn test_discard_watchpoint_and_value_match() {
        let mut dbg = Debugger::new();
        let i = dbg.add_watchpoint(0x30, WatchKind::Discard);
        dbg.watchpoints[i].value_match = Some(0xAA);
        dbg.check_discard(&Discard::UnknownAddress { addr: 0x30, data: 0x55 }, 1);
        assert!(dbg.take_hit().is_none());
        dbg.check_discard(&Discard::UnknownAddress { addr: 0x30, data: 0xAA }, 2);
        assert_eq!(dbg.take_hit().map(|h| h.access), Some(WatchKind::Discard));
        dbg.check_discard(&Discard::Truncated { bits: 3 }, 3);
        assert!(dbg.take_hit().is_none());
    }

    #[test]
    fn test_list_watchpoints() {
        let mut dbg = Debugger::new();
        assert!(dbg.list_watchpoints().contains("No watchpoints"));
        dbg.add_watchpoint(0x02, WatchKind::Any);
        dbg.add_watchpoint(0x30, WatchKind::Discard);
        dbg.check_commit(0x02, 0x00, 0x01, 5);
        let list = dbg.list_watchpoints();
        assert!(list.contains("[0]  0x02 PWM_SEL  CD  hits=1"));
        assert!(list.contains("[1]  0x30 -        D  hits=0"));
    }

    #[test]
    fn test_reg_name() {
        assert_eq!(reg_name(0x00), Some("EN_OUT"));
        assert_eq!(reg_name(0x03), None);
    }
}
