use super::*;
use crate::virtual_machine::assembler::assemble_source;
use crate::virtual_machine::config::UNLIMITED;
use crate::virtual_machine::native::{ALLOC, PRINT_I64, SharedOutput};
use crate::virtual_machine::program::Instruction;
use std::cell::RefCell;
use std::rc::Rc;

fn machine(source: &str) -> Machine {
    let assembly = assemble_source(source).unwrap();
    Machine::new(assembly.program)
}

fn run_vm(source: &str) -> Machine {
    let mut vm = machine(source);
    let outcome = vm.run(&NativeRegistry::standard(), UNLIMITED).unwrap();
    assert_eq!(outcome, Outcome::Halted);
    vm
}

fn run_expect_fault(source: &str) -> (Machine, Fault) {
    let mut vm = machine(source);
    let fault = vm.run(&NativeRegistry::standard(), UNLIMITED).unwrap_err();
    (vm, fault)
}

fn ints(vm: &Machine) -> Vec<i64> {
    vm.stack().as_slice().iter().map(|w| w.as_i64()).collect()
}

fn top_f64(vm: &Machine) -> f64 {
    vm.stack().peek(0).unwrap().as_f64()
}

// ==================== Scenarios ====================

#[test]
fn add_two_numbers() {
    let vm = run_vm("put 2\nput 3\niplus\nstop");
    assert_eq!(ints(&vm), [5]);
    assert_eq!(vm.status(), Status::Halted);
}

#[test]
fn forward_jump_skips_instruction() {
    let vm = run_vm("jmp skip\nput 99\nskip:\nstop");
    assert!(vm.stack().is_empty());
}

#[test]
fn integer_divide_by_zero_keeps_operands() {
    let (vm, fault) = run_expect_fault("put 1\nput 0\nidiv");
    assert_eq!(fault, Fault { exception: Exception::DivideByZero, address: 2 });
    assert_eq!(ints(&vm), [1, 0]);
    assert_eq!(vm.ip(), 2);
    assert_eq!(vm.status(), Status::Faulted(Exception::DivideByZero));
}

#[test]
fn dup_past_bottom_underflows() {
    let (vm, fault) = run_expect_fault("put 1\nput 2\ndup 5");
    assert_eq!(fault.exception, Exception::StackUnderflow);
    assert_eq!(fault.address, 2);
    assert_eq!(ints(&vm), [1, 2]);
}

// ==================== Stack shaping ====================

#[test]
fn dup_and_swap() {
    let vm = run_vm("put 1\nput 2\nput 3\ndup 2\nswap 1\nstop");
    assert_eq!(ints(&vm), [1, 2, 1, 3]);
}

#[test]
fn drop_discards_top() {
    let vm = run_vm("put 1\nput 2\ndrop\nstop");
    assert_eq!(ints(&vm), [1]);
}

#[test]
fn swap_past_bottom_underflows() {
    let (_, fault) = run_expect_fault("put 1\nswap 1");
    assert_eq!(fault.exception, Exception::StackUnderflow);
}

#[test]
fn negative_depth_underflows() {
    let (_, fault) = run_expect_fault("put 1\ndup -1");
    assert_eq!(fault.exception, Exception::StackUnderflow);
}

#[test]
fn kaput_only_advances() {
    let vm = run_vm("kaput\nkaput\nstop");
    assert!(vm.stack().is_empty());
    assert_eq!(vm.ip(), 2);
    assert_eq!(vm.steps(), 3);
}

#[test]
fn push_at_capacity_overflows() {
    let program = assemble_source("put 1\nput 2\nput 3\nstop").unwrap().program;
    let mut vm = Machine::with_limits(program, &Limits::default().with_stack_capacity(2));
    let fault = vm.run(&NativeRegistry::new(), UNLIMITED).unwrap_err();
    assert_eq!(fault, Fault { exception: Exception::StackOverflow, address: 2 });
    assert_eq!(vm.stack().len(), 2);
}

#[test]
fn dup_at_capacity_overflows() {
    let program = assemble_source("put 1\ndup 0\nstop").unwrap().program;
    let mut vm = Machine::with_limits(program, &Limits::default().with_stack_capacity(1));
    let fault = vm.run(&NativeRegistry::new(), UNLIMITED).unwrap_err();
    assert_eq!(fault.exception, Exception::StackOverflow);
}

// ==================== Arithmetic ====================

#[test]
fn integer_arithmetic() {
    assert_eq!(ints(&run_vm("put 7\nput 3\niminus\nstop")), [4]);
    assert_eq!(ints(&run_vm("put -6\nput 7\nimul\nstop")), [-42]);
    assert_eq!(ints(&run_vm("put 7\nput 2\nidiv\nstop")), [3]);
    assert_eq!(ints(&run_vm("put -7\nput 2\nidiv\nstop")), [-3]);
    assert_eq!(ints(&run_vm("put 7\nput 3\nimod\nstop")), [1]);
    assert_eq!(ints(&run_vm("put -7\nput 3\nimod\nstop")), [-1]);
}

#[test]
fn integer_arithmetic_wraps() {
    let vm = run_vm("put 9223372036854775807\nput 1\niplus\nstop");
    assert_eq!(ints(&vm), [i64::MIN]);
    let vm = run_vm("put -9223372036854775808\nput -1\nidiv\nstop");
    assert_eq!(ints(&vm), [i64::MIN]);
    let vm = run_vm("put -9223372036854775808\nput -1\nimod\nstop");
    assert_eq!(ints(&vm), [0]);
}

#[test]
fn modulo_by_zero() {
    let (vm, fault) = run_expect_fault("put 5\nput 0\nimod");
    assert_eq!(fault.exception, Exception::DivideByZero);
    assert_eq!(ints(&vm), [5, 0]);
}

#[test]
fn float_arithmetic() {
    assert_eq!(top_f64(&run_vm("put 1.5\nput 2.25\nfplus\nstop")), 3.75);
    assert_eq!(top_f64(&run_vm("put 1.5\nput 2.0\nfminus\nstop")), -0.5);
    assert_eq!(top_f64(&run_vm("put 1.5\nput 4.0\nfmul\nstop")), 6.0);
    assert_eq!(top_f64(&run_vm("put 1.0\nput 4.0\nfdiv\nstop")), 0.25);
    assert_eq!(top_f64(&run_vm("put 7.5\nput 2.0\nfmod\nstop")), 1.5);
    assert_eq!(top_f64(&run_vm("put -7.5\nput 2.0\nfmod\nstop")), -1.5);
}

#[test]
fn float_division_by_zero_does_not_fault() {
    assert_eq!(top_f64(&run_vm("put 1.0\nput 0.0\nfdiv\nstop")), f64::INFINITY);
    assert_eq!(top_f64(&run_vm("put -1.0\nput 0.0\nfdiv\nstop")), f64::NEG_INFINITY);
    assert!(top_f64(&run_vm("put 0.0\nput 0.0\nfdiv\nstop")).is_nan());
    assert!(top_f64(&run_vm("put 1.0\nput 0.0\nfmod\nstop")).is_nan());
}

#[test]
fn integer_literal_is_not_a_float() {
    // `put 2` stores integer bits; float opcodes read them as a tiny subnormal.
    let vm = run_vm("put 2\nput 2\nfplus\nstop");
    assert_eq!(vm.stack().peek(0).unwrap().as_u64(), 4);
}

#[test]
fn binary_ops_underflow_with_one_value() {
    for op in ["iplus", "iminus", "imul", "idiv", "imod", "fplus", "fdiv", "ieq", "flt"] {
        let (vm, fault) = run_expect_fault(&format!("put 1\n{op}"));
        assert_eq!(fault.exception, Exception::StackUnderflow, "{op}");
        assert_eq!(ints(&vm), [1], "{op}");
    }
}

#[test]
fn unary_ops_underflow_when_empty() {
    for op in ["drop", "not", "jif 0", "return", "dup 0"] {
        let (_, fault) = run_expect_fault(op);
        assert_eq!(fault.exception, Exception::StackUnderflow, "{op}");
        assert_eq!(fault.address, 0, "{op}");
    }
}

// ==================== Comparisons ====================

#[test]
fn integer_comparisons() {
    let cases: [(&str, i64, i64, i64); 9] = [
        ("ieq", 3, 3, 1),
        ("ieq", 3, 4, 0),
        ("igt", 4, 3, 1),
        ("igt", 3, 3, 0),
        ("ilt", -1, 0, 1),
        ("ige", 3, 3, 1),
        ("ige", 2, 3, 0),
        ("ile", 3, 3, 1),
        ("ile", 4, 3, 0),
    ];
    for (op, a, b, expected) in cases {
        let vm = run_vm(&format!("put {a}\nput {b}\n{op}\nstop"));
        assert_eq!(ints(&vm), [expected], "{a} {op} {b}");
    }
}

#[test]
fn float_comparisons() {
    let cases: [(&str, &str, &str, i64); 6] = [
        ("feq", "0.5", "0.5", 1),
        ("fgt", "1.5", "0.5", 1),
        ("flt", "1.5", "0.5", 0),
        ("fge", "0.5", "0.5", 1),
        ("fle", "-0.5", "0.5", 1),
        ("feq", "nan", "nan", 0),
    ];
    for (op, a, b, expected) in cases {
        let vm = run_vm(&format!("put {a}\nput {b}\n{op}\nstop"));
        assert_eq!(ints(&vm), [expected], "{a} {op} {b}");
    }
}

#[test]
fn not_negates_in_place() {
    assert_eq!(ints(&run_vm("put 0\nnot\nstop")), [1]);
    assert_eq!(ints(&run_vm("put 9\nput -3\nnot\nstop")), [9, 0]);
    assert_eq!(ints(&run_vm("put 3\nput 3\nieq\nnot\nstop")), [0]);
}

// ==================== Control flow ====================

#[test]
fn jif_always_pops() {
    let taken = run_vm("put 7\nput 1\njif end\nput 99\nend: stop");
    assert_eq!(ints(&taken), [7]);
    let not_taken = run_vm("put 7\nput 0\njif end\nput 99\nend: stop");
    assert_eq!(ints(&not_taken), [7, 99]);
}

#[test]
fn jif_treats_any_nonzero_as_true() {
    let vm = run_vm("put -5\njif end\nput 99\nend: stop");
    assert!(vm.stack().is_empty());
}

#[test]
fn countdown_loop() {
    let source = "\
put 0          -- accumulator
put 5          -- counter
loop:
  swap 1
  dup 1
  iplus
  swap 1
  put 1
  iminus
  dup 0
  jif loop
drop
stop";
    let vm = run_vm(source);
    assert_eq!(ints(&vm), [15]);
}

#[test]
fn invoke_and_return() {
    let source = "\
put 20
invoke double
put 1
iplus
stop
double:
  swap 1
  dup 0
  iplus
  swap 1
  return";
    let vm = run_vm(source);
    assert_eq!(ints(&vm), [41]);
}

#[test]
fn invoke_pushes_next_address() {
    let mut vm = machine("kaput\ninvoke 3\nstop\nstop");
    let natives = NativeRegistry::new();
    vm.step(&natives).unwrap();
    vm.step(&natives).unwrap();
    assert_eq!(ints(&vm), [2]);
    assert_eq!(vm.ip(), 3);
}

#[test]
fn nested_calls_unwind_in_order() {
    let source = "\
invoke outer
stop
outer:
  put 1
  swap 1
  invoke inner
  swap 1
  put 3
  swap 1
  return
inner:
  put 2
  swap 1
  return";
    let vm = run_vm(source);
    assert_eq!(ints(&vm), [1, 2, 3]);
}

#[test]
fn recursive_factorial() {
    // fact(n) leaves n! in place of n.
    let source = "\
put 10
invoke fact
stop
fact:
  swap 1
  dup 0
  put 1
  ile
  jif base
  dup 0
  put 1
  iminus
  invoke fact
  imul
  swap 1
  return
base:
  drop
  put 1
  swap 1
  return";
    let vm = run_vm(source);
    assert_eq!(ints(&vm), [3_628_800]);
}

#[test]
fn running_off_the_end_faults() {
    let (vm, fault) = run_expect_fault("put 1");
    assert_eq!(
        fault,
        Fault { exception: Exception::IllegalInstructionAccess, address: 1 }
    );
    assert_eq!(ints(&vm), [1]);
}

#[test]
fn jump_out_of_bounds_faults_on_fetch() {
    let (_, fault) = run_expect_fault("jmp 100\nstop");
    assert_eq!(fault.exception, Exception::IllegalInstructionAccess);
    assert_eq!(fault.address, 100);
}

#[test]
fn empty_program_faults() {
    let mut vm = Machine::new(Program::default());
    assert_eq!(vm.step(&NativeRegistry::new()), Err(Exception::IllegalInstructionAccess));
}

#[test]
fn invalid_opcode_faults() {
    let program = Program::try_from(vec![Instruction::from_raw(200, Word::ZERO)]).unwrap();
    let mut vm = Machine::new(program);
    let fault = vm.run(&NativeRegistry::new(), UNLIMITED).unwrap_err();
    assert_eq!(fault.exception, Exception::InvalidInstruction);
    assert_eq!(vm.ip(), 0);
}

#[test]
fn sentinel_opcode_faults() {
    use crate::virtual_machine::isa::OPCODE_COUNT;
    let program = Program::try_from(vec![Instruction::from_raw(OPCODE_COUNT, Word::ZERO)]).unwrap();
    let mut vm = Machine::new(program);
    assert_eq!(vm.step(&NativeRegistry::new()), Err(Exception::InvalidInstruction));
}

// ==================== Halt, budget, step ====================

#[test]
fn stop_does_not_advance() {
    let mut vm = machine("put 1\nstop\nput 2");
    let natives = NativeRegistry::new();
    assert_eq!(vm.run(&natives, UNLIMITED), Ok(Outcome::Halted));
    assert_eq!(vm.ip(), 1);
    // Running a halted machine does nothing.
    assert_eq!(vm.run(&natives, UNLIMITED), Ok(Outcome::Halted));
    assert_eq!(ints(&vm), [1]);
}

#[test]
fn zero_limit_executes_nothing() {
    let mut vm = machine("put 1\nstop");
    assert_eq!(vm.run(&NativeRegistry::new(), 0), Ok(Outcome::LimitReached));
    assert!(vm.stack().is_empty());
    assert_eq!(vm.steps(), 0);
    assert_eq!(vm.status(), Status::Running);
}

#[test]
fn positive_limit_bounds_steps() {
    let mut vm = machine("loop: jmp loop");
    let natives = NativeRegistry::new();
    assert_eq!(vm.run(&natives, 64), Ok(Outcome::LimitReached));
    assert_eq!(vm.steps(), 64);
    // A later call continues where the last one stopped.
    assert_eq!(vm.run(&natives, 6), Ok(Outcome::LimitReached));
    assert_eq!(vm.steps(), 70);
}

#[test]
fn limit_exactly_reaching_stop() {
    let mut vm = machine("put 1\nstop");
    assert_eq!(vm.run(&NativeRegistry::new(), 2), Ok(Outcome::Halted));
}

#[test]
fn single_step() {
    let mut vm = machine("put 2\nput 3\niplus\nstop");
    let natives = NativeRegistry::new();
    vm.step(&natives).unwrap();
    assert_eq!(ints(&vm), [2]);
    assert_eq!(vm.ip(), 1);
    vm.step(&natives).unwrap();
    vm.step(&natives).unwrap();
    assert_eq!(ints(&vm), [5]);
    vm.step(&natives).unwrap();
    assert!(vm.is_halted());
}

#[test]
fn stepping_halted_machine_does_nothing() {
    let mut vm = machine("stop");
    let natives = NativeRegistry::new();
    for _ in 0..3 {
        assert_eq!(vm.step(&natives), Ok(()));
    }
    assert_eq!(vm.steps(), 1);
    assert_eq!(vm.ip(), 0);
    assert_eq!(vm.status(), Status::Halted);
}

#[test]
fn faulted_machine_stays_faulted() {
    let mut vm = machine("drop\nstop");
    let natives = NativeRegistry::new();
    assert_eq!(vm.step(&natives), Err(Exception::StackUnderflow));
    assert_eq!(vm.step(&natives), Err(Exception::StackUnderflow));
    assert_eq!(vm.ip(), 0);
    assert_eq!(vm.steps(), 0);
    let fault = vm.run(&natives, UNLIMITED).unwrap_err();
    assert_eq!(fault.exception, Exception::StackUnderflow);
}

#[test]
fn reset_restarts_run() {
    let mut vm = machine("put 1\nput 0\nidiv\nstop");
    let natives = NativeRegistry::new();
    assert!(vm.run(&natives, UNLIMITED).is_err());
    vm.reset();
    assert_eq!(vm.status(), Status::Running);
    assert!(vm.stack().is_empty());
    assert_eq!(vm.ip(), 0);
    assert_eq!(vm.run(&natives, 2), Ok(Outcome::LimitReached));
    assert_eq!(ints(&vm), [1, 0]);
}

#[test]
fn machines_are_independent() {
    let natives = NativeRegistry::new();
    let mut a = machine("put 1\nstop");
    let mut b = machine("put 2\nput 3\nstop");
    a.step(&natives).unwrap();
    b.run(&natives, UNLIMITED).unwrap();
    a.run(&natives, UNLIMITED).unwrap();
    assert_eq!(ints(&a), [1]);
    assert_eq!(ints(&b), [2, 3]);
}

// ==================== Natives ====================

#[test]
fn native_index_out_of_range() {
    let (vm, fault) = run_expect_fault("put 1\nnative 5\nstop");
    assert_eq!(fault, Fault { exception: Exception::IllegalOperation, address: 1 });
    assert_eq!(vm.ip(), 1);
    assert_eq!(ints(&vm), [1]);
}

#[test]
fn native_with_empty_registry() {
    let mut vm = machine("native 0\nstop");
    assert_eq!(vm.step(&NativeRegistry::new()), Err(Exception::IllegalOperation));
    assert_eq!(vm.ip(), 0);
}

#[test]
fn custom_native_manipulates_stack() {
    let mut natives = NativeRegistry::new();
    let square = natives.register("square", |vm: &mut Machine| {
        let top = vm.stack_mut().top_mut()?;
        *top = Word::from_i64(top.as_i64() * top.as_i64());
        Ok(())
    });
    let mut vm = machine(&format!("put 12\nnative {square}\nstop"));
    vm.run(&natives, UNLIMITED).unwrap();
    assert_eq!(ints(&vm), [144]);
}

#[test]
fn native_error_faults_machine() {
    let mut natives = NativeRegistry::new();
    natives.register("fail", |_: &mut Machine| Err(Exception::IllegalOperation));
    let mut vm = machine("native 0\nstop");
    let fault = vm.run(&natives, UNLIMITED).unwrap_err();
    assert_eq!(fault.exception, Exception::IllegalOperation);
    assert_eq!(vm.ip(), 0);
}

#[test]
fn failing_native_changes_are_kept() {
    let mut natives = NativeRegistry::new();
    natives.register("push_then_fail", |vm: &mut Machine| {
        vm.stack_mut().push(Word::from_i64(7))?;
        Err(Exception::IllegalOperation)
    });
    let mut vm = machine("native 0\nstop");
    let fault = vm.run(&natives, UNLIMITED).unwrap_err();
    assert_eq!(fault, Fault { exception: Exception::IllegalOperation, address: 0 });
    assert_eq!(ints(&vm), [7]);
}

#[test]
fn standard_natives_from_bytecode() {
    let buffer = Rc::new(RefCell::new(Vec::new()));
    let output: SharedOutput = buffer.clone();
    let natives = NativeRegistry::standard_with_output(output);
    let source = format!(
        "put 8\nnative {ALLOC}\ndup 0\nnative 1\nput 6\nput 7\nimul\nnative {PRINT_I64}\nput 0.5\nnative 2\nstop"
    );
    let mut vm = machine(&source);
    vm.run(&natives, UNLIMITED).unwrap();
    let printed = String::from_utf8(buffer.borrow().clone()).unwrap();
    assert_eq!(printed, "42\n0.500000\n");
    assert_eq!(vm.stack().len(), 1);
    assert_eq!(vm.heap().live(), 0);
}

#[test]
fn alloc_loop_exhausts_heap() {
    let program = assemble_source("loop:\nput 16\nnative 0\njmp loop").unwrap().program;
    let limits = Limits::default().with_heap_capacity(64);
    let mut vm = Machine::with_limits(program, &limits);
    let fault = vm.run(&NativeRegistry::standard(), 1000).unwrap_err();
    assert_eq!(fault, Fault { exception: Exception::IllegalOperation, address: 1 });
    assert_eq!(vm.heap().live(), 4);
    assert_eq!(vm.heap().used(), 64);
    assert_eq!(vm.stack().len(), 5);
    assert_eq!(vm.stack().peek(0).unwrap().as_i64(), 16);
}

#[test]
fn freed_heap_bytes_are_reusable() {
    let source = "\
loop:
  put 16
  native 0
  native 1
  jmp loop";
    let program = assemble_source(source).unwrap().program;
    let limits = Limits::default().with_heap_capacity(16);
    let mut vm = Machine::with_limits(program, &limits);
    assert_eq!(vm.run(&NativeRegistry::standard(), 400), Ok(Outcome::LimitReached));
    assert_eq!(vm.heap().used(), 0);
}

#[test]
fn double_free_is_illegal() {
    let (_, fault) = run_expect_fault("put 1\nnative 0\ndup 0\nnative 1\nnative 1\nstop");
    assert_eq!(fault, Fault { exception: Exception::IllegalOperation, address: 4 });
}

// ==================== Serialization and dumps ====================

#[test]
fn reloaded_program_behaves_identically() {
    let source = "put 20\ninvoke double\nstop\ndouble:\nswap 1\ndup 0\niplus\nswap 1\nreturn";
    let program = assemble_source(source).unwrap().program;
    let reloaded = Program::from_bytes(&program.to_bytes(), 1024).unwrap();

    let natives = NativeRegistry::new();
    let mut direct = Machine::new(program);
    let mut loaded = Machine::new(reloaded);
    assert_eq!(direct.run(&natives, UNLIMITED), loaded.run(&natives, UNLIMITED));
    assert_eq!(ints(&direct), ints(&loaded));
    assert_eq!(ints(&direct), [40]);
}

#[test]
fn dump_stack_format() {
    let vm = run_vm("put -1\nput 1.0\nstop");
    let mut out = Vec::new();
    vm.dump_stack(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Stack:");
    assert!(lines[1].starts_with("  U64: 18446744073709551615, I64: -1, F64: NaN"));
    assert_eq!(
        lines[2],
        "  U64: 4607182418800017408, I64: 4607182418800017408, F64: 1.000000, PTR: 0x3ff0000000000000"
    );
}

#[test]
fn dump_empty_stack() {
    let vm = machine("stop");
    let mut out = Vec::new();
    vm.dump_stack(&mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "Stack: [empty]\n");
}

// ==================== Demo programs ====================

fn run_printing(source: &str) -> (Machine, String) {
    let buffer = Rc::new(RefCell::new(Vec::new()));
    let natives = NativeRegistry::standard_with_output(buffer.clone());
    let mut vm = machine(source);
    assert_eq!(vm.run(&natives, UNLIMITED), Ok(Outcome::Halted));
    let printed = String::from_utf8(buffer.borrow().clone()).unwrap();
    (vm, printed)
}

#[test]
fn demo_countdown() {
    let (vm, printed) = run_printing(include_str!("../../../demos/countdown.qas"));
    let expected: String = (1..=10).rev().map(|n| format!("{n}\n")).collect();
    assert_eq!(printed, expected);
    assert!(vm.stack().is_empty());
}

#[test]
fn demo_factorial() {
    let (vm, printed) = run_printing(include_str!("../../../demos/factorial.qas"));
    assert_eq!(printed, "3628800\n");
    assert!(vm.stack().is_empty());
}

#[test]
fn demo_circle() {
    let (_, printed) = run_printing(include_str!("../../../demos/circle.qas"));
    assert_eq!(printed, "19.634954\n");
}

#[test]
fn demo_heap() {
    let (vm, printed) = run_printing(include_str!("../../../demos/heap.qas"));
    assert_eq!(printed, "0x1\n");
    assert_eq!(vm.heap().live(), 0);
    assert!(vm.stack().is_empty());
}
