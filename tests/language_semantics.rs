//! Language semantics tests.
//!
//! Whole programs are run to completion through the interpreter. Results are
//! read back from Allbugs globals, the line log and the failure log, since
//! finished bugs leave the world.

use bugs_lang::bug::Color;
use bugs_lang::interpreter::Interpreter;
use bugs_lang::output::Command;
use bugs_lang::scheduler::RunConfig;
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

const WAIT: Duration = Duration::from_secs(10);

/// Load, start running, and wait until every bug has finished.
fn run_to_end(source: &str) -> Interpreter {
    let program = bugs_lang::load(source).unwrap_or_else(|e| panic!("{}", e));
    let config = RunConfig {
        pause_ms: 0,
        start_running: true,
    };
    let mut interpreter = Interpreter::new(program, config).unwrap();
    interpreter.start().unwrap();
    assert!(
        interpreter.wait_until_finished(WAIT),
        "program did not finish"
    );
    interpreter
}

/// Run a program and read one Allbugs variable.
fn global_after(source: &str, name: &str) -> f64 {
    let interpreter = run_to_end(source);
    assert!(
        interpreter.failures().is_empty(),
        "unexpected failures: {:?}",
        interpreter.failures()
    );
    interpreter
        .global(name)
        .unwrap_or_else(|| panic!("no global {}", name))
}

/// Assert two floats are within a small tolerance.
fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {}, got {}",
        expected,
        actual
    );
}

fn last_line(interpreter: &Interpreter) -> Command {
    *interpreter.lines().last().expect("no lines were drawn")
}

// =============================================================================
// Expressions
// =============================================================================

#[test]
fn test_precedence() {
    let source = "Allbugs {\nvar r\n}\nBug a {\nr = 12 * 5 - 3 * 4 / 6 + 8\n}\n";
    assert_close(global_after(source, "r"), 66.0);
}

#[test]
fn test_epsilon_comparisons() {
    let source = "\
Allbugs {
    var same, different
}
Bug a {
    same = 2.9999999 = 3
    different = 3 != 3
}
";
    let interpreter = run_to_end(source);
    assert_eq!(interpreter.global("same"), Some(1.0));
    assert_eq!(interpreter.global("different"), Some(0.0));
}

// =============================================================================
// Control flow
// =============================================================================

#[test]
fn test_loop_exit() {
    let source = "\
Allbugs {
    var foo
}
Bug a {
    foo = 0
    loop {
        foo = foo + 1
        exit if foo > 3
    }
}
";
    assert_close(global_after(source, "foo"), 4.0);
}

#[test]
fn test_loop_with_actions() {
    let source = "\
Bug a {
    var n
    loop {
        move 1
        n = n + 1
        exit if n >= 5
    }
}
";
    let interpreter = run_to_end(source);
    assert_eq!(interpreter.lines().len(), 5);
    assert_close(last_line(&interpreter).x2, 5.0);
}

#[test]
fn test_switch_first_match() {
    let source = "\
Bug a {
    switch {
        case 0+0
            moveto 1, 2
        case 3+4
            moveto 15, 30
        case 1
            moveto 99, 99
    }
}
";
    let interpreter = run_to_end(source);
    assert_eq!(interpreter.lines().len(), 1);
    let line = last_line(&interpreter);
    assert_eq!((line.x2, line.y2), (15.0, 30.0));
}

#[test]
fn test_exit_outside_loop_is_noop() {
    let source = "\
Allbugs {
    var after
}
Bug a {
    exit if 1
    after = 1
}
";
    assert_close(global_after(source, "after"), 1.0);
}

#[test]
fn test_exit_inside_function_ends_callers_loop() {
    let source = "\
Allbugs {
    var n
}
Bug a {
    loop {
        n = n + 1
        do stop
        exit if n > 5
    }
    move 1
    define stop {
        exit if 1
    }
}
";
    let interpreter = run_to_end(source);
    assert_eq!(interpreter.global("n"), Some(1.0));
    assert_eq!(interpreter.lines().len(), 1);
}

#[test]
fn test_exit_inside_function_called_from_expression() {
    let source = "\
Allbugs {
    var n, r
}
Bug a {
    loop {
        n = n + 1
        r = halt(n)
        n = n + 10
    }
    define halt using k {
        exit if k >= 1
        return k
    }
}
";
    let interpreter = run_to_end(source);
    assert!(interpreter.failures().is_empty());
    assert_eq!(interpreter.global("n"), Some(1.0));
    assert_eq!(interpreter.global("r"), Some(0.0));
}

#[test]
fn test_return_slot_starts_clear_for_each_call() {
    let source = "\
Allbugs {
    var r
}
Bug a {
    initially {
        return 5
    }
    r = idle()
    define idle {
        move 1
    }
}
";
    assert_close(global_after(source, "r"), 0.0);
}

#[test]
fn test_return_in_main_block_ends_bug() {
    let source = "\
Bug a {
    move 1
    return 0
    move 1
}
";
    let interpreter = run_to_end(source);
    assert_eq!(interpreter.lines().len(), 1);
}

// =============================================================================
// Pose
// =============================================================================

#[test]
fn test_turn_wraparound() {
    let source = "\
Allbugs {
    var heading
}
Bug a {
    turnto 151
    turn 300
    heading = angle
}
";
    assert_close(global_after(source, "heading"), 91.0);
}

#[test]
fn test_move_trigonometry() {
    let source = "\
Bug a {
    moveto 10, 10
    turnto 90
    move 10
}
";
    let interpreter = run_to_end(source);
    let line = last_line(&interpreter);
    assert_close(line.x1, 10.0);
    assert_close(line.y1, 10.0);
    assert_close(line.x2, 10.0);
    assert_close(line.y2, 0.0);
}

#[test]
fn test_colors_and_pen_up() {
    let source = "\
Bug a {
    move 1
    color green
    move 1
    color none
    move 1
    color purple
    line 0, 0, 5, 5
}
";
    let interpreter = run_to_end(source);
    let colors: Vec<Color> = interpreter.lines().iter().map(|l| l.color).collect();
    assert_eq!(colors, vec![Color::Black, Color::Green, Color::Purple]);
}

#[test]
fn test_line_does_not_move_bug() {
    let source = "\
Allbugs {
    var px, py
}
Bug a {
    line 1, 2, 3, 4
    px = x
    py = y
}
";
    let interpreter = run_to_end(source);
    assert_eq!(interpreter.global("px"), Some(0.0));
    assert_eq!(interpreter.global("py"), Some(0.0));
    let line = last_line(&interpreter);
    assert_eq!((line.x1, line.y1, line.x2, line.y2), (1.0, 2.0, 3.0, 4.0));
}

// =============================================================================
// Functions
// =============================================================================

#[test]
fn test_recursive_function() {
    let source = "\
Allbugs {
    var steps
    define halvings using n {
        switch {
            case n <= 1
                return 0
        }
        return 1 + halvings(n / 2)
    }
}
Bug a {
    steps = halvings(64)
}
";
    assert_close(global_after(source, "steps"), 6.0);
}

#[test]
fn test_parameter_scoping() {
    let source = "\
Allbugs {
    var seen, result
}
Bug a {
    var n
    n = 3
    result = bump(10)
    seen = n
    define bump using n {
        n = n + 1
        return n
    }
}
";
    let interpreter = run_to_end(source);
    assert_eq!(interpreter.global("result"), Some(11.0));
    assert_eq!(interpreter.global("seen"), Some(3.0));
}

#[test]
fn test_allbugs_function_moves_caller() {
    let source = "\
Allbugs {
    define square using side {
        move side
        turn 90
        move side
        turn 90
        move side
        turn 90
        move side
        turn 90
    }
}
Bug a {
    do square(10)
}
Bug b {
    moveto 100, 100
    do square(5)
}
";
    let interpreter = run_to_end(source);
    assert!(interpreter.failures().is_empty());
    assert_eq!(interpreter.lines().len(), 9);
}

#[test]
fn test_argument_count_mismatch_fails_bug() {
    let source = "\
Bug a {
    do twice(1, 2)
    define twice using v {
        return v * 2
    }
}
";
    let interpreter = run_to_end(source);
    let failures = interpreter.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].bug, "a");
    assert!(failures[0].message.contains("twice"));
}

// =============================================================================
// Bugs reading each other
// =============================================================================

#[test]
fn test_dot_access_between_bugs() {
    let source = "\
Allbugs {
    var check, speed
}
Bug A {
    turn 0
    check = 2 < B.x
    speed = B.pace
}
Bug B {
    var pace
    pace = 7
    moveto 5, 0
    turn 0
    turn 0
}
";
    let interpreter = run_to_end(source);
    assert!(interpreter.failures().is_empty());
    assert_eq!(interpreter.global("check"), Some(1.0));
    assert_eq!(interpreter.global("speed"), Some(7.0));
}

#[test]
fn test_distance_and_direction_between_bugs() {
    let source = "\
Allbugs {
    var d, heading
}
Bug A {
    turn 0
    d = distance(B)
    heading = direction(B)
}
Bug B {
    moveto 0, -10
    turn 0
    turn 0
}
";
    let interpreter = run_to_end(source);
    assert_close(interpreter.global("d").unwrap(), 10.0);
    assert_close(interpreter.global("heading").unwrap(), 90.0);
}

#[test]
fn test_missing_bug_is_runtime_error() {
    let source = "\
Allbugs {
    var v
}
Bug A {
    v = Nobody.x
}
";
    let interpreter = run_to_end(source);
    let failures = interpreter.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.contains("Nobody"));
}

#[test]
fn test_runtime_errors_are_reported() {
    let cases = [
        ("Bug a {\nmove missing\n}\n", "missing"),
        ("Bug a {\ndo nowhere()\n}\n", "nowhere"),
        ("Bug a {\ncolor loop\n}\n", "loop"),
        ("Bug a {\nvar y\nmove 1\n}\n", "y"),
        ("Bug a {\nx = 0 / 0\nmove x\n}\n", "NaN"),
    ];
    for (source, fragment) in cases {
        let interpreter = run_to_end(source);
        let failures = interpreter.failures();
        assert_eq!(failures.len(), 1, "{}", source);
        assert!(
            failures[0].message.contains(fragment),
            "{:?} should mention {}",
            failures[0].message,
            fragment
        );
    }
}
