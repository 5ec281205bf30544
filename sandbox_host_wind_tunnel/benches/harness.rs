// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use sandbox_host::call::CallId;
use sandbox_host::harness::{ExecConfig, ExecFlags, ExecutionContext, MIN_STACK_SIZE};
use sandbox_host::registry::CallRegistry;
use sandbox_host::sandbox::{Sandbox, SandboxConfig};
use sandbox_host::services::{HostServices, ManualClock, NoDevices, NullConsole};
use sandbox_host::store::RamStore;
use sandbox_host::trace::{TraceMask, TraceSink};
use sandbox_host_wind_tunnel::{add_chain, args_memcpy, call_loop, counted_loop};

fn bench_harness(c: &mut Criterion) {
    bench_add_chain(c);
    bench_counted_loop(c);
    bench_counted_loop_traced_instr(c);
    bench_host_call_loop(c);
    bench_memcpy(c);
    bench_sandbox_run(c);
}

fn wide_open(budget: u32) -> ExecConfig {
    ExecConfig {
        flags: ExecFlags::NONE,
        branch_budget: budget,
    }
}

/// Configures and executes `code` once with no extra grants.
fn run_once(
    registry: &CallRegistry,
    code: &[u8],
    config: ExecConfig,
    trace: Option<&mut dyn TraceSink>,
) -> i64 {
    let mut stack = [0_u8; MIN_STACK_SIZE];
    let mut args = [0_u8; 16];
    let mut console = NullConsole;
    let mut devices = NoDevices;
    let mut clock = ManualClock::new(0).with_step(1);
    let mut services = HostServices::new(&mut console, &mut devices, &mut clock);
    let mut ctx = ExecutionContext::new(registry);
    ctx.configure(code, &mut stack, config).unwrap();
    ctx.execute(&mut services, &mut args, trace).unwrap().value
}

fn bench_add_chain(c: &mut Criterion) {
    let registry = CallRegistry::standard();
    let mut group = c.benchmark_group("add_chain");
    for &len in &[10_u32, 100, 1000] {
        let code = add_chain(len).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(len), &code, |b, code| {
            b.iter(|| black_box(run_once(&registry, code, wide_open(0), None)));
        });
    }
    group.finish();
}

fn bench_counted_loop(c: &mut Criterion) {
    let registry = CallRegistry::standard();
    let mut group = c.benchmark_group("counted_loop");
    for &n in &[10_i32, 100, 1000] {
        let code = counted_loop(n).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &code, |b, code| {
            b.iter(|| black_box(run_once(&registry, code, wide_open(n as u32), None)));
        });
    }
    group.finish();
}

fn bench_counted_loop_traced_instr(c: &mut Criterion) {
    let registry = CallRegistry::standard();
    let mut group = c.benchmark_group("counted_loop_traced_instr");
    for &n in &[10_i32, 100] {
        let code = counted_loop(n).unwrap();
        let mut sink = CountingInstr::default();
        group.bench_with_input(BenchmarkId::from_parameter(n), &code, |b, code| {
            b.iter(|| {
                black_box(run_once(
                    &registry,
                    code,
                    wide_open(n as u32),
                    Some(&mut sink),
                ))
            });
        });
        black_box(sink.count);
    }
    group.finish();
}

fn bench_host_call_loop(c: &mut Criterion) {
    let registry = CallRegistry::standard();
    let mut group = c.benchmark_group("host_call_loop");
    for &n in &[10_i32, 100] {
        let code = call_loop(CallId(0x60), n).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &code, |b, code| {
            b.iter(|| black_box(run_once(&registry, code, wide_open(n as u32), None)));
        });
    }
    group.finish();
}

fn bench_memcpy(c: &mut Criterion) {
    let registry = CallRegistry::standard();
    let code = args_memcpy().unwrap();
    c.bench_function("memcpy_args", |b| {
        b.iter(|| black_box(run_once(&registry, &code, wide_open(0), None)));
    });
}

fn bench_sandbox_run(c: &mut Criterion) {
    let mut store = RamStore::default();
    store.install(".ram.0", &counted_loop(50).unwrap()).unwrap();
    let sandbox = Sandbox::new(store, CallRegistry::standard(), SandboxConfig::default());
    let mut payload = [0_u8; 64];
    c.bench_function("sandbox_run", |b| {
        b.iter(|| {
            let mut console = NullConsole;
            let mut devices = NoDevices;
            let mut clock = ManualClock::new(0);
            let mut services = HostServices::new(&mut console, &mut devices, &mut clock);
            black_box(sandbox.run(&mut services, &mut payload, ".ram.0").unwrap());
        });
    });
}

#[derive(Default)]
struct CountingInstr {
    count: u64,
}

impl TraceSink for CountingInstr {
    fn mask(&self) -> TraceMask {
        TraceMask::INSTR
    }

    fn instr(&mut self, _pc: usize, _opcode: u8) {
        self.count = self.count.wrapping_add(1);
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(std::time::Duration::from_millis(300))
        .measurement_time(std::time::Duration::from_millis(1200))
        .sample_size(60);
    targets = bench_harness
}
criterion_main!(benches);
