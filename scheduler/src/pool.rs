//! Registry of remote solver workers
//!
//! The pool is the authoritative in-memory view of which solvers exist,
//! which are busy, and which still answer their health probes. It is plain
//! state behind `&mut self`; the scheduler serializes access through a
//! single lock and the pool never talks to the transport itself — sweep
//! results tell the caller what to publish.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use shared::{JobId, SolverId};

/// Probe state of the two-phase liveness protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    /// Answered its latest probe, or has shown traffic since
    Healthy,
    /// Probe sent at the given instant, waiting for any sign of life
    Pending(Instant),
}

/// A remote solver worker known to the pool
#[derive(Debug, Clone)]
pub struct Solver {
    id: SolverId,
    busy: bool,
    /// Claimed by an allocation that has not confirmed dispatch yet
    reserved: bool,
    assigned_job: Option<JobId>,
    probe: ProbeState,
}

impl Solver {
    fn new(id: SolverId) -> Self {
        Self {
            id,
            busy: false,
            reserved: false,
            assigned_job: None,
            probe: ProbeState::Healthy,
        }
    }

    pub fn id(&self) -> &SolverId {
        &self.id
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_healthy(&self) -> bool {
        self.probe == ProbeState::Healthy
    }

    pub fn assigned_job(&self) -> Option<JobId> {
        self.assigned_job
    }

    /// Allocatable: unassigned, unclaimed, and past its last probe
    fn is_idle(&self) -> bool {
        !self.busy && !self.reserved && self.is_healthy()
    }
}

/// Outcome of one health sweep pass
#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// Solvers that should receive a probe now
    pub ping: Vec<SolverId>,
    /// Solvers evicted for staying silent, with the job each was bound to
    pub evicted: Vec<(SolverId, Option<JobId>)>,
}

#[derive(Debug)]
pub struct SolverPool {
    solvers: HashMap<SolverId, Solver>,
    probe_grace: Duration,
}

impl SolverPool {
    pub fn new(probe_grace: Duration) -> Self {
        Self {
            solvers: HashMap::new(),
            probe_grace,
        }
    }

    /// Add a solver if it is not known yet. Idempotent by identifier; an
    /// existing record is left untouched.
    pub fn register(&mut self, id: SolverId) {
        self.solvers.entry(id.clone()).or_insert_with(|| Solver::new(id));
    }

    /// Drop a solver; no-op when the id is unknown
    pub fn deregister(&mut self, id: &SolverId) {
        self.solvers.remove(id);
    }

    pub fn lookup(&self, id: &SolverId) -> Option<&Solver> {
        self.solvers.get(id)
    }

    pub fn len(&self) -> usize {
        self.solvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solvers.is_empty()
    }

    pub fn idle_count(&self) -> usize {
        self.solvers.values().filter(|s| s.is_idle()).count()
    }

    /// Reserve exactly `n` idle solvers, or none at all.
    ///
    /// The returned solvers are not busy yet — the caller confirms each one
    /// with [`confirm`](Self::confirm) once dispatch is certain, or hands it
    /// back with [`release`](Self::release). While reserved they are
    /// invisible to other allocations, which is what makes the
    /// allocate-then-mark sequence safe against interleaved queue checks.
    pub fn allocate_idle(&mut self, n: usize) -> Option<Vec<SolverId>> {
        let idle: Vec<SolverId> = self
            .solvers
            .values()
            .filter(|s| s.is_idle())
            .map(|s| s.id.clone())
            .take(n)
            .collect();

        if idle.len() < n {
            return None;
        }

        for id in &idle {
            if let Some(solver) = self.solvers.get_mut(id) {
                solver.reserved = true;
            }
        }
        Some(idle)
    }

    /// Turn a reservation into a live assignment
    pub fn confirm(&mut self, id: &SolverId, job: JobId) {
        if let Some(solver) = self.solvers.get_mut(id) {
            solver.reserved = false;
            solver.busy = true;
            solver.assigned_job = Some(job);
        }
    }

    /// Hand back an unconfirmed reservation
    pub fn release(&mut self, id: &SolverId) {
        if let Some(solver) = self.solvers.get_mut(id) {
            solver.reserved = false;
        }
    }

    /// Unbind a solver when its part completes. Returns false if the solver
    /// was not busy, so a duplicate completion cannot double-clear.
    pub fn clear_busy(&mut self, id: &SolverId) -> bool {
        match self.solvers.get_mut(id) {
            Some(solver) if solver.busy => {
                solver.busy = false;
                solver.assigned_job = None;
                true
            }
            _ => false,
        }
    }

    /// Overwrite a solver's reported assignment (from a pong)
    pub fn set_assignment(&mut self, id: &SolverId, job: Option<JobId>) {
        if let Some(solver) = self.solvers.get_mut(id) {
            solver.busy = job.is_some();
            solver.assigned_job = job;
        }
    }

    /// Solvers still bound to the given job
    pub fn busy_count_for(&self, job: JobId) -> usize {
        self.solvers
            .values()
            .filter(|s| s.busy && s.assigned_job == Some(job))
            .count()
    }

    /// Clear probe-pending state; called on any inbound signal from the
    /// solver, not only explicit pongs
    pub fn mark_healthy(&mut self, id: &SolverId) {
        if let Some(solver) = self.solvers.get_mut(id) {
            solver.probe = ProbeState::Healthy;
        }
    }

    /// One pass of the two-phase liveness protocol: healthy solvers get a
    /// probe and flip to pending; solvers whose probe has been outstanding
    /// past the grace period are evicted.
    pub fn health_sweep(&mut self, now: Instant) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        for solver in self.solvers.values_mut() {
            match solver.probe {
                ProbeState::Healthy => {
                    solver.probe = ProbeState::Pending(now);
                    outcome.ping.push(solver.id.clone());
                }
                ProbeState::Pending(since) if now.duration_since(since) >= self.probe_grace => {
                    outcome.evicted.push((solver.id.clone(), solver.assigned_job));
                }
                ProbeState::Pending(_) => {}
            }
        }

        for (id, _) in &outcome.evicted {
            self.solvers.remove(id);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(3600);

    fn pool() -> SolverPool {
        SolverPool::new(GRACE)
    }

    #[test]
    fn register_creates_an_idle_healthy_solver() {
        let mut pool = pool();
        pool.register(SolverId::from("w-1"));

        let solver = pool.lookup(&SolverId::from("w-1")).unwrap();
        assert!(!solver.is_busy());
        assert!(solver.is_healthy());
        assert_eq!(solver.assigned_job(), None);
    }

    #[test]
    fn register_is_idempotent_by_identifier() {
        let mut pool = pool();
        pool.register(SolverId::from("w-1"));
        pool.set_assignment(&SolverId::from("w-1"), Some(JobId(4)));
        pool.register(SolverId::from("w-1"));

        assert_eq!(pool.len(), 1);
        // the existing record survives a re-register
        assert!(pool.lookup(&SolverId::from("w-1")).unwrap().is_busy());
    }

    #[test]
    fn deregister_is_a_noop_for_unknown_ids() {
        let mut pool = pool();
        pool.register(SolverId::from("w-1"));
        pool.deregister(&SolverId::from("w-2"));
        assert_eq!(pool.len(), 1);

        pool.deregister(&SolverId::from("w-1"));
        assert!(pool.lookup(&SolverId::from("w-1")).is_none());
    }

    #[test]
    fn allocation_is_all_or_nothing() {
        let mut pool = pool();
        pool.register(SolverId::from("w-1"));
        pool.register(SolverId::from("w-2"));

        assert!(pool.allocate_idle(3).is_none());
        // the failed attempt must not have claimed anything
        assert_eq!(pool.idle_count(), 2);

        let got = pool.allocate_idle(2).unwrap();
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn reserved_solvers_are_invisible_to_later_allocations() {
        let mut pool = pool();
        pool.register(SolverId::from("w-1"));
        pool.register(SolverId::from("w-2"));
        pool.register(SolverId::from("w-3"));

        let first = pool.allocate_idle(2).unwrap();
        let second = pool.allocate_idle(1).unwrap();
        assert!(!second.iter().any(|id| first.contains(id)));

        // a third allocation must fail rather than hand anything out twice
        assert!(pool.allocate_idle(1).is_none());
    }

    #[test]
    fn released_reservations_become_allocatable_again() {
        let mut pool = pool();
        pool.register(SolverId::from("w-1"));

        let got = pool.allocate_idle(1).unwrap();
        assert!(pool.allocate_idle(1).is_none());

        pool.release(&got[0]);
        assert!(pool.allocate_idle(1).is_some());
    }

    #[test]
    fn confirm_binds_the_job_and_clear_busy_is_exactly_once() {
        let mut pool = pool();
        pool.register(SolverId::from("w-1"));

        let got = pool.allocate_idle(1).unwrap();
        pool.confirm(&got[0], JobId(9));
        assert_eq!(pool.busy_count_for(JobId(9)), 1);

        assert!(pool.clear_busy(&got[0]));
        assert_eq!(pool.busy_count_for(JobId(9)), 0);
        // duplicate completion must not clear twice
        assert!(!pool.clear_busy(&got[0]));
    }

    #[test]
    fn probed_solvers_are_not_idle_until_they_answer() {
        let mut pool = pool();
        pool.register(SolverId::from("w-1"));

        let outcome = pool.health_sweep(Instant::now());
        assert_eq!(outcome.ping.len(), 1);
        assert_eq!(pool.idle_count(), 0);

        pool.mark_healthy(&SolverId::from("w-1"));
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn silent_solvers_are_evicted_after_the_grace_period() {
        let mut pool = pool();
        pool.register(SolverId::from("w-1"));

        let start = Instant::now();
        let outcome = pool.health_sweep(start);
        assert_eq!(outcome.ping, vec![SolverId::from("w-1")]);
        assert!(outcome.evicted.is_empty());

        // still within grace: nothing happens
        let outcome = pool.health_sweep(start + GRACE / 2);
        assert!(outcome.ping.is_empty());
        assert!(outcome.evicted.is_empty());

        // past grace: evicted exactly once, with its binding reported
        let outcome = pool.health_sweep(start + GRACE);
        assert_eq!(outcome.evicted, vec![(SolverId::from("w-1"), None)]);
        assert!(pool.is_empty());
    }

    #[test]
    fn an_answered_probe_resets_the_cycle() {
        let mut pool = pool();
        pool.register(SolverId::from("w-1"));

        let start = Instant::now();
        pool.health_sweep(start);
        pool.mark_healthy(&SolverId::from("w-1"));

        // the next sweep pings again instead of evicting
        let outcome = pool.health_sweep(start + GRACE * 2);
        assert_eq!(outcome.ping.len(), 1);
        assert!(outcome.evicted.is_empty());
    }

    #[test]
    fn eviction_reports_the_job_a_busy_solver_was_bound_to() {
        let mut pool = pool();
        pool.register(SolverId::from("w-1"));
        let got = pool.allocate_idle(1).unwrap();
        pool.confirm(&got[0], JobId(3));

        let start = Instant::now();
        pool.health_sweep(start);
        let outcome = pool.health_sweep(start + GRACE);
        assert_eq!(outcome.evicted, vec![(SolverId::from("w-1"), Some(JobId(3)))]);
    }
}
