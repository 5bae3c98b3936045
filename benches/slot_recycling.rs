//! Slot Recycling Benchmarks
//!
//! Measures steady-state cost of the tracked buffer acquire/release cycle,
//! recycled resource lookup and surface layout computation.

use std::collections::VecDeque;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lamco_encode_buffers::allocator::{AllocParams, EncodeAllocator, SurfaceFormat};
use lamco_encode_buffers::buffers::{
    BufferType, RecycleResId, RecycleResource, ReferenceList, TrackedBuffer,
};
use lamco_encode_buffers::config::{RecycleConfig, TrackedBufferConfig};

fn tracked_buffer(refs: usize, lazy_release: bool) -> TrackedBuffer {
    let config = TrackedBufferConfig {
        max_ref_slots: refs,
        max_non_ref_slots: 2,
        wait_timeout_ms: 1000,
        lazy_release,
    };
    let tracked = TrackedBuffer::new(Arc::new(EncodeAllocator::system_memory()), &config)
        .expect("tracked buffer");
    tracked
        .register_param(
            BufferType::MvTemporalBuffer,
            AllocParams::buffer("mvTemporalBuffer", 64 * 1024),
        )
        .expect("register mv");
    tracked
        .register_param(
            BufferType::Ds4xSurface,
            AllocParams::surface("4xDSSurface", 480, 320, SurfaceFormat::Nv12),
        )
        .expect("register ds4x");
    tracked
}

/// Acquire, fetch per-slot resources and complete one frame with a sliding
/// reference window of `num_refs` frames
fn encode_frame(tracked: &TrackedBuffer, window: &mut VecDeque<u32>, frame_idx: u32, num_refs: usize) {
    let mut ref_list = ReferenceList::new(frame_idx).with_refs(window.iter().copied());
    let slot = tracked
        .acquire_default(&mut ref_list, frame_idx == 0)
        .expect("acquire");
    black_box(tracked.get_buffer(BufferType::MvTemporalBuffer, slot).expect("mv"));
    black_box(tracked.get_surface(BufferType::Ds4xSurface, slot).expect("ds4x"));
    tracked.release(&ref_list).expect("release");

    window.push_back(frame_idx);
    while window.len() > num_refs {
        window.pop_front();
    }
}

/// Benchmark one acquire/release cycle as the reference window grows
fn bench_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracked_acquire_release");
    group.throughput(Throughput::Elements(1));

    for num_refs in [1usize, 4, 8, 15] {
        for (policy, lazy) in [("eager", false), ("lazy", true)] {
            group.bench_with_input(BenchmarkId::new(policy, num_refs), &num_refs, |b, &num_refs| {
                let tracked = tracked_buffer(num_refs, lazy);
                let mut window = VecDeque::new();
                // Warm the queues so the loop measures recycling, not allocation
                for frame_idx in 0..32 {
                    encode_frame(&tracked, &mut window, frame_idx, num_refs);
                }

                let mut frame_idx = 32u32;
                b.iter(|| {
                    encode_frame(&tracked, &mut window, frame_idx, num_refs);
                    frame_idx += 1;
                })
            });
        }
    }

    group.finish();
}

/// Benchmark round-robin lookup of an already materialized resource
fn bench_recycle_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("recycle_lookup");
    group.throughput(Throughput::Elements(1));

    for limit in [1usize, 2, 6, 16] {
        let recycle = RecycleResource::new(
            Arc::new(EncodeAllocator::system_memory()),
            &RecycleConfig::default(),
        );
        recycle
            .register_resource(RecycleResId::PakInfo, AllocParams::buffer("pakInfo", 4096), limit)
            .expect("register");
        for frame in 0..limit as u32 {
            recycle.get_buffer(RecycleResId::PakInfo, frame).expect("prime");
        }

        group.bench_with_input(BenchmarkId::new("pak_info", limit), &recycle, |b, recycle| {
            let mut frame = 0u32;
            b.iter(|| {
                frame = frame.wrapping_add(1);
                black_box(recycle.get_buffer(RecycleResId::PakInfo, black_box(frame)).expect("get"))
            })
        });
    }

    group.finish();
}

/// Benchmark layout computation for downscaled surfaces
fn bench_surface_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("surface_layout");

    let resolutions = [
        (640, 480, "480p"),
        (1280, 720, "720p"),
        (1920, 1080, "1080p"),
        (3840, 2160, "4K"),
    ];

    for (width, height, name) in resolutions {
        let params = AllocParams::surface("4xDSSurface", width / 4, height / 4, SurfaceFormat::Nv12);
        group.bench_with_input(BenchmarkId::new("nv12", name), &params, |b, params| {
            b.iter(|| black_box(params.layout()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_recycle_lookup,
    bench_surface_layout
);
criterion_main!(benches);
