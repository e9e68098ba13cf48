//! Program execution: shared world state and the run-control surface.
//!
//! [`Interpreter::new`] interprets the Allbugs section into a [`World`] and
//! registers one bug per definition. [`Interpreter::start`] spawns a control
//! thread, which spawns one thread per bug and then drives the round barrier
//! until every bug has finished or the interpreter is killed.
//!
//! # Shared state
//!
//! | Field      | Guard   | Atomicity |
//! |------------|---------|-----------|
//! | globals    | `Mutex` | each read or write; last writer wins |
//! | functions  | none    | immutable after construction |
//! | bugs       | `Mutex` | registry of live bugs; finished bugs are removed |
//! | lines      | `Mutex` | append with id assignment under one lock |
//! | failures   | `Mutex` | append only |

use crate::ast::{Program, Tree};
use crate::bug::{Bug, BugHandle, Color, BUILT_IN_FIELDS};
use crate::error::{BugFailure, RuntimeError};
use crate::output::{BugSnapshot, Command, WorldSnapshot};
use crate::scheduler::{lock, Control, RunConfig};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// =============================================================================
// World
// =============================================================================

/// State shared by every bug of a running program.
#[derive(Debug, Default)]
pub struct World {
    globals: Mutex<HashMap<String, f64>>,
    functions: HashMap<String, Tree>,
    bugs: Mutex<Vec<Arc<BugHandle>>>,
    lines: Mutex<Vec<Command>>,
    failures: Mutex<Vec<BugFailure>>,
}

impl World {
    /// An empty world: no globals, no functions, no bugs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpret an `Allbugs(list(var...), list(function...))` tree.
    ///
    /// A childless `Allbugs` (no Allbugs section) gives an empty world.
    pub fn from_allbugs(allbugs: &Tree) -> Result<Self, RuntimeError> {
        let mut globals = HashMap::new();
        if let Some(declarations) = allbugs.child(0) {
            for declaration in &declarations.children {
                for name in &declaration.children {
                    if BUILT_IN_FIELDS.contains(&name.text()) {
                        return Err(RuntimeError::ReservedName(name.text().to_string()));
                    }
                    globals.insert(name.text().to_string(), 0.0);
                }
            }
        }

        let mut functions = HashMap::new();
        if let Some(definitions) = allbugs.child(1) {
            for function in &definitions.children {
                let name = function.expect_child(0)?.text().to_string();
                functions.insert(name, function.clone());
            }
        }

        Ok(Self {
            globals: Mutex::new(globals),
            functions,
            ..Self::default()
        })
    }

    /// Value of a global variable.
    pub fn global(&self, name: &str) -> Option<f64> {
        lock(&self.globals).get(name).copied()
    }

    /// Assign to an existing global. Returns `false` if no such global exists.
    pub fn set_global(&self, name: &str, value: f64) -> bool {
        match lock(&self.globals).get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// An Allbugs function by name.
    pub fn function(&self, name: &str) -> Option<Tree> {
        self.functions.get(name).cloned()
    }

    pub fn add_bug(&self, handle: Arc<BugHandle>) {
        lock(&self.bugs).push(handle);
    }

    pub fn remove_bug(&self, id: usize) {
        lock(&self.bugs).retain(|bug| bug.id() != id);
    }

    /// The first live bug with the given name.
    pub fn find_bug(&self, name: &str) -> Option<Arc<BugHandle>> {
        lock(&self.bugs)
            .iter()
            .find(|bug| bug.name() == name)
            .cloned()
    }

    /// Live bugs in definition order.
    pub fn bugs(&self) -> Vec<Arc<BugHandle>> {
        lock(&self.bugs).clone()
    }

    /// Append a segment to the line log and return its id.
    pub fn add_line(&self, x1: f64, y1: f64, x2: f64, y2: f64, color: Color) -> u64 {
        let mut lines = lock(&self.lines);
        let id = lines.len() as u64;
        lines.push(Command {
            x1,
            y1,
            x2,
            y2,
            color,
            id,
        });
        id
    }

    /// A copy of the line log, oldest first.
    pub fn lines(&self) -> Vec<Command> {
        lock(&self.lines).clone()
    }

    pub fn record_failure(&self, failure: BugFailure) {
        lock(&self.failures).push(failure);
    }

    pub fn failures(&self) -> Vec<BugFailure> {
        lock(&self.failures).clone()
    }
}

// =============================================================================
// Interpreter
// =============================================================================

/// Runs a parsed program under round-synchronized control.
///
/// # Example
///
/// ```rust
/// use bugs_lang::interpreter::Interpreter;
/// use bugs_lang::scheduler::RunConfig;
/// use std::time::Duration;
///
/// let program = bugs_lang::load("Bug Sally {\n    move 10\n}\n").unwrap();
/// let config = RunConfig { pause_ms: 0, start_running: false };
/// let mut interpreter = Interpreter::new(program, config).unwrap();
/// interpreter.start().unwrap();
///
/// interpreter.step();
/// assert!(interpreter.wait_until_idle(Duration::from_secs(5)));
/// assert_eq!(interpreter.lines().len(), 1);
///
/// interpreter.run();
/// assert!(interpreter.wait_until_finished(Duration::from_secs(5)));
/// ```
pub struct Interpreter {
    program: Program,
    config: RunConfig,
    world: Arc<World>,
    control: Arc<Control>,
    driver: Option<JoinHandle<()>>,
    started: bool,
}

impl Interpreter {
    /// Interpret the Allbugs section and register every bug, blocked.
    pub fn new(program: Program, config: RunConfig) -> Result<Self, RuntimeError> {
        let (world, control) = Self::build(&program, &config)?;
        Ok(Self {
            program,
            config,
            world,
            control,
            driver: None,
            started: false,
        })
    }

    fn build(
        program: &Program,
        config: &RunConfig,
    ) -> Result<(Arc<World>, Arc<Control>), RuntimeError> {
        let world = World::from_allbugs(&program.allbugs)?;
        let control = Control::new(config);
        for (id, definition) in program.bugs.iter().enumerate() {
            let name = definition.expect_child(0)?.text();
            world.add_bug(Arc::new(BugHandle::new(id, name)));
            control.register(id);
        }
        Ok((Arc::new(world), Arc::new(control)))
    }

    /// Spawn the control thread and the bug threads. Does nothing if already started.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.driver.is_some() {
            return Ok(());
        }

        let bugs: Vec<(Arc<BugHandle>, Tree)> = self
            .world
            .bugs()
            .into_iter()
            .filter_map(|handle| {
                let definition = self.program.bugs.get(handle.id())?.clone();
                Some((handle, definition))
            })
            .collect();
        let world = Arc::clone(&self.world);
        let control = Arc::clone(&self.control);

        info!("starting {} bug(s)", bugs.len());
        let driver = thread::Builder::new()
            .name("bugs-control".to_string())
            .spawn(move || {
                let workers: Vec<JoinHandle<()>> = bugs
                    .into_iter()
                    .filter_map(|(handle, tree)| {
                        spawn_bug(handle, tree, Arc::clone(&world), Arc::clone(&control))
                    })
                    .collect();
                control.run_rounds();
                for worker in workers {
                    let _ = worker.join();
                }
                info!("all bugs stopped");
            })
            .map_err(|e| RuntimeError::Spawn(e.to_string()))?;

        self.driver = Some(driver);
        self.started = true;
        Ok(())
    }

    /// Grant exactly one round, then pause.
    pub fn step(&self) {
        self.control.step();
    }

    /// Grant rounds continuously.
    pub fn run(&self) {
        self.control.run();
    }

    /// Stop granting rounds.
    pub fn pause(&self) {
        self.control.pause();
    }

    /// Stop every bug at its next statement or handshake and wait for the threads.
    pub fn kill(&mut self) {
        if !self.control.is_killed() {
            info!("killing interpreter");
        }
        self.control.kill();
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }
    }

    /// Kill, then rebuild from the loaded program.
    ///
    /// If the interpreter had been started it is started again, paused.
    pub fn reset(&mut self) -> Result<(), RuntimeError> {
        self.kill();
        info!("resetting interpreter");
        let (world, control) = Self::build(&self.program, &self.config)?;
        control.pause();
        self.world = world;
        self.control = control;
        if self.started {
            self.start()?;
        }
        Ok(())
    }

    /// Change the pause between rounds.
    pub fn set_pause_interval(&mut self, milliseconds: u64) {
        debug!("pause interval set to {}ms", milliseconds);
        self.config.pause_ms = milliseconds;
        self.control.set_pause(Duration::from_millis(milliseconds));
    }

    // -------------------------------------------------------------------------
    // Read API
    // -------------------------------------------------------------------------

    /// Poses of the live bugs.
    pub fn bugs(&self) -> Vec<BugSnapshot> {
        self.world.bugs().iter().map(|bug| bug.snapshot()).collect()
    }

    /// The line log, oldest first.
    pub fn lines(&self) -> Vec<Command> {
        self.world.lines()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            bugs: self.bugs(),
            lines: self.lines(),
            rounds: self.rounds(),
            failures: self.failures(),
        }
    }

    /// Value of an Allbugs variable.
    pub fn global(&self, name: &str) -> Option<f64> {
        self.world.global(name)
    }

    /// Bugs that stopped on a runtime error.
    pub fn failures(&self) -> Vec<BugFailure> {
        self.world.failures()
    }

    pub fn rounds(&self) -> u64 {
        self.control.rounds()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Returns `true` once no bug is live.
    pub fn is_finished(&self) -> bool {
        self.control.live_count() == 0
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// See [`Control::wait_until_idle`].
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.control.wait_until_idle(timeout)
    }

    /// See [`Control::wait_until_finished`].
    pub fn wait_until_finished(&self, timeout: Duration) -> bool {
        self.control.wait_until_finished(timeout)
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Spawn the thread for one bug. On spawn failure the bug is dropped from
/// the world and the barrier so the others can proceed.
fn spawn_bug(
    handle: Arc<BugHandle>,
    definition: Tree,
    world: Arc<World>,
    control: Arc<Control>,
) -> Option<JoinHandle<()>> {
    let id = handle.id();
    let name = handle.name().to_string();
    let spawned = {
        let world = Arc::clone(&world);
        let control = Arc::clone(&control);
        thread::Builder::new()
            .name(format!("bug-{}", name))
            .spawn(move || run_bug(handle, definition, world, control))
    };
    match spawned {
        Ok(worker) => Some(worker),
        Err(e) => {
            error!("could not start bug {}: {}", name, e);
            world.record_failure(BugFailure {
                bug: name,
                message: e.to_string(),
            });
            world.remove_bug(id);
            control.terminate(id);
            None
        }
    }
}

/// Body of a bug thread: wait for the first permit, run the definition, leave.
fn run_bug(handle: Arc<BugHandle>, definition: Tree, world: Arc<World>, control: Arc<Control>) {
    let id = handle.id();
    let name = handle.name().to_string();
    let mut bug = Bug::new(handle, Arc::clone(&world), Arc::clone(&control));

    let result = control
        .get_work_permit(id)
        .and_then(|()| bug.interpret(&definition).map(|_| ()));

    match result {
        Ok(()) => debug!("bug {} finished", name),
        Err(RuntimeError::Halted) => debug!("bug {} halted", name),
        Err(e) => {
            error!("bug {} failed: {}", name, e);
            world.record_failure(BugFailure {
                bug: name,
                message: e.to_string(),
            });
        }
    }

    world.remove_bug(id);
    control.terminate(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    const WAIT: Duration = Duration::from_secs(5);

    fn interpreter(source: &str) -> Interpreter {
        let program = Parser::new(source).parse_program().unwrap();
        let config = RunConfig {
            pause_ms: 0,
            start_running: false,
        };
        Interpreter::new(program, config).unwrap()
    }

    #[test]
    fn test_world_from_allbugs() {
        let mut parser = Parser::new("Allbugs {\nvar a, b\ndefine f {\nreturn 1\n}\n}\n");
        let allbugs = parser.is_allbugs_code().unwrap().unwrap();
        let world = World::from_allbugs(&allbugs).unwrap();
        assert_eq!(world.global("a"), Some(0.0));
        assert!(world.set_global("b", 2.0));
        assert_eq!(world.global("b"), Some(2.0));
        assert!(!world.set_global("c", 2.0));
        assert!(world.function("f").is_some());
    }

    #[test]
    fn test_allbugs_reserved_global() {
        let program = Parser::new("Allbugs {\nvar angle\n}\nBug a {\nmove 1\n}\n")
            .parse_program()
            .unwrap();
        assert!(matches!(
            Interpreter::new(program, RunConfig::default()),
            Err(RuntimeError::ReservedName(_))
        ));
    }

    #[test]
    fn test_line_ids_increase() {
        let world = World::new();
        let a = world.add_line(0.0, 0.0, 1.0, 1.0, Color::Red);
        let b = world.add_line(1.0, 1.0, 2.0, 2.0, Color::Blue);
        assert!(a < b);
        assert_eq!(world.lines().len(), 2);
    }

    #[test]
    fn test_bugs_start_blocked() {
        let mut interp = interpreter("Bug a {\nmove 1\n}\n");
        interp.start().unwrap();
        assert!(interp.wait_until_idle(WAIT));
        assert!(interp.lines().is_empty());
        assert_eq!(interp.bugs().len(), 1);
        assert!(!interp.is_finished());
    }

    #[test]
    fn test_finished_bugs_leave_world() {
        let mut interp = interpreter("Bug a {\nmove 1\n}\n");
        interp.start().unwrap();
        interp.run();
        assert!(interp.wait_until_finished(WAIT));
        assert!(interp.bugs().is_empty());
        assert_eq!(interp.lines().len(), 1);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut interp = interpreter("Allbugs {\nvar count\n}\nBug a {\ncount = 5\nmove 1\n}\n");
        interp.start().unwrap();
        interp.run();
        assert!(interp.wait_until_finished(WAIT));
        assert_eq!(interp.global("count"), Some(5.0));

        interp.reset().unwrap();
        assert_eq!(interp.global("count"), Some(0.0));
        assert!(interp.lines().is_empty());
        assert_eq!(interp.bugs().len(), 1);
        assert!(!interp.is_running());

        interp.step();
        assert!(interp.wait_until_idle(WAIT));
        assert_eq!(interp.lines().len(), 1);
        assert_eq!(interp.global("count"), Some(5.0));
    }

    #[test]
    fn test_snapshot_json() {
        let interp = interpreter("Bug a {\nmove 1\n}\n");
        let json = serde_json::to_value(interp.snapshot()).unwrap();
        assert_eq!(json["bugs"][0]["name"], "a");
        assert_eq!(json["bugs"][0]["color"], "black");
        assert_eq!(json["rounds"], 0);
    }
}
