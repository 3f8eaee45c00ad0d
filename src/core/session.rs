// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession owns the arena that backs every symbolic name the backend keeps (field and
// method owners, names, descriptors, string literals, data labels and label prefixes), so HIR and
// LIR nodes can hold plain `&'arena str` references instead of owned strings. Names are interned,
// which makes repeated constant-pool references to the same member share storage. The session also
// accumulates SessionStats across every method compiled with it: blocks built and pruned, loop
// heads found, HIR nodes and merge nodes created or elided, LIR instructions, phi moves and calls.
// A session is single-threaded (RefCell interior mutability); compile methods in parallel by giving
// each thread its own arena and session.

//! Arena-based compilation session management.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena-based compilation session.
///
/// All interned strings live as long as the arena, which in turn outlives every
/// graph and compiled method produced in this session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for session-lifetime data.
    arena: &'arena Bump,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,

    /// String interning table.
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned: &'arena str = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Record a finished method.
    pub fn record_method_compiled(&self, name: &str, lir_instructions: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.methods_compiled += 1;
        stats.lir_instructions += lir_instructions;

        if stats.largest_method_size < lir_instructions {
            stats.largest_method_size = lir_instructions;
            stats.largest_method_name = name.to_string();
        }
    }

    /// Record the blocks produced by partitioning.
    pub fn record_blocks_built(&self, count: usize) {
        self.stats.borrow_mut().blocks_built += count;
    }

    /// Record blocks removed as unreachable.
    pub fn record_blocks_pruned(&self, count: usize) {
        self.stats.borrow_mut().blocks_pruned += count;
    }

    /// Record loop heads found by the flow analyzer.
    pub fn record_loop_heads(&self, count: usize) {
        self.stats.borrow_mut().loop_heads += count;
    }

    /// Record a HIR node of the given kind.
    pub fn record_hir_node(&self, kind: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.hir_nodes += 1;
        *stats.hir_counts.entry(kind.to_string()).or_insert(0) += 1;
    }

    /// Record a merge node created at a join.
    pub fn record_phi_created(&self) {
        self.stats.borrow_mut().phis_created += 1;
    }

    /// Record a merge node removed by the phi optimizer.
    pub fn record_phi_elided(&self) {
        self.stats.borrow_mut().phis_elided += 1;
    }

    /// Record an edge move emitted for a merge argument.
    pub fn record_phi_move(&self) {
        self.stats.borrow_mut().phi_moves += 1;
    }

    /// Record a lowered call site.
    pub fn record_call_lowered(&self, target: &str) {
        self.stats.borrow_mut().calls_lowered += 1;
        log::trace!("Call site lowered: {}", target);
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of methods compiled.
    pub methods_compiled: usize,

    /// Basic blocks produced by partitioning.
    pub blocks_built: usize,

    /// Blocks removed as unreachable.
    pub blocks_pruned: usize,

    /// Loop heads found.
    pub loop_heads: usize,

    /// HIR nodes created.
    pub hir_nodes: usize,

    /// HIR nodes per kind.
    pub hir_counts: HashMap<String, usize>,

    /// Merge nodes created.
    pub phis_created: usize,

    /// Merge nodes elided as trivial.
    pub phis_elided: usize,

    /// LIR instructions in finished methods.
    pub lir_instructions: usize,

    /// Largest method compiled, in LIR instructions.
    pub largest_method_size: usize,

    /// Name of the largest method.
    pub largest_method_name: String,

    /// Moves emitted to resolve merge nodes.
    pub phi_moves: usize,

    /// Call sites lowered.
    pub calls_lowered: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Methods compiled: {}", self.methods_compiled)?;
        writeln!(f, "  Blocks built: {} ({} pruned)", self.blocks_built, self.blocks_pruned)?;
        writeln!(f, "  Loop heads: {}", self.loop_heads)?;
        writeln!(f, "  HIR nodes: {}", self.hir_nodes)?;
        writeln!(f, "  Merge nodes: {} created, {} elided", self.phis_created, self.phis_elided)?;
        writeln!(f, "  LIR instructions: {}", self.lir_instructions)?;
        writeln!(f, "  Phi moves: {}", self.phi_moves)?;
        writeln!(f, "  Calls lowered: {}", self.calls_lowered)?;

        if !self.largest_method_name.is_empty() {
            writeln!(
                f,
                "  Largest method: {} ({} instructions)",
                self.largest_method_name, self.largest_method_size
            )?;
        }

        if !self.hir_counts.is_empty() {
            writeln!(f, "  HIR breakdown:")?;
            let mut sorted: Vec<_> = self.hir_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (kind, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", kind, count)?;
            }
        }

        Ok(())
    }
}
