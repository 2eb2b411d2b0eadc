//! Device-backed integration tests. Each one needs a working GPU adapter,
//! so they are `#[ignore]`d by default; run with:
//!
//!   cargo test --test gpu_pipelines -- --include-ignored

use texflow::{
    GpuContext, Kernel, NumericGrid, RenderTargetSet, TexelFormat, TexflowError, reference_map,
    run_map, run_reduce,
};

fn gpu() -> GpuContext {
    GpuContext::new_blocking().expect("no gpu adapter available")
}

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn unit_float(seed: u64) -> f32 {
    (mix64(seed.wrapping_add(0x9E37_79B9_7F4A_7C15)) >> 40) as f32 / (1u64 << 24) as f32
}

#[test]
#[ignore = "requires a GPU adapter"]
fn roundtrip_preserves_values() {
    let ctx = gpu();
    for (w, h) in [(5, 5), (3, 7), (64, 1), (1, 1)] {
        let data = NumericGrid::from_fn(w, h, 1, |x, y, _| (y * w + x) as f32 + 1.0).unwrap();
        let targets =
            RenderTargetSet::create(&ctx, TexelFormat::R32Float, w, h, &[Some(&data)]).unwrap();
        let back = targets.read_attachment(&ctx, 0, w, h).unwrap();
        assert_eq!(data.as_slice(), back.as_slice(), "{w}x{h}");
    }
}

#[test]
#[ignore = "requires a GPU adapter"]
fn roundtrip_preserves_rgba_values() {
    let ctx = gpu();
    let data = NumericGrid::from_fn(6, 4, 4, |x, y, c| unit_float((y * 6 + x) as u64 * 4 + c as u64))
        .unwrap();
    let targets =
        RenderTargetSet::create(&ctx, TexelFormat::Rgba32Float, 6, 4, &[Some(&data)]).unwrap();
    let back = targets.read_attachment(&ctx, 0, 6, 4).unwrap();
    assert_eq!(data.as_slice(), back.as_slice());
}

#[test]
#[ignore = "requires a GPU adapter"]
fn map_matches_scalar_reference() {
    let ctx = gpu();
    let n = 32;
    let x = NumericGrid::from_fn(n, n, 1, |x, y, _| unit_float((y * n + x) as u64)).unwrap();
    let y = NumericGrid::from_fn(n, n, 1, |x, yy, _| unit_float(1000 + (yy * n + x) as u64)).unwrap();
    let alpha = 1.0 / 9.0;
    let iterations = 10;

    let got = run_map(&ctx, &x, &y, alpha, iterations).unwrap();
    let want = reference_map(&x, &y, alpha, iterations);
    for (i, (&g, &w)) in got.as_slice().iter().zip(want.as_slice()).enumerate() {
        let tolerance = 1e-3 * w.abs().max(1.0);
        assert!(
            (g - w).abs() <= tolerance,
            "element {i}: gpu {g} vs cpu {w}"
        );
    }
}

#[test]
#[ignore = "requires a GPU adapter"]
fn map_zero_iterations_returns_y() {
    let ctx = gpu();
    let x = NumericGrid::from_fn(4, 4, 1, |_, _, _| 99.0).unwrap();
    let y = NumericGrid::from_fn(4, 4, 1, |x, yy, _| (yy * 4 + x) as f32).unwrap();
    let got = run_map(&ctx, &x, &y, 0.5, 0).unwrap();
    assert_eq!(got.as_slice(), y.as_slice());
}

#[test]
#[ignore = "requires a GPU adapter"]
fn reduce_example_grid_is_nine() {
    let ctx = gpu();
    let grid = NumericGrid::from_vec(
        4,
        4,
        1,
        vec![
            1.0, 5.0, 3.0, 2.0, //
            8.0, 4.0, 0.0, 6.0, //
            7.0, 2.0, 9.0, 1.0, //
            3.0, 3.0, 3.0, 3.0,
        ],
    )
    .unwrap();
    assert_eq!(run_reduce(&ctx, &grid).unwrap(), 9.0);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn reduce_finds_exact_maximum() {
    let ctx = gpu();
    for k in [1u32, 3, 6] {
        let extent = 1 << k;
        let grid = NumericGrid::from_fn(extent, extent, 1, |x, y, _| {
            let s = (y * extent + x) as u64;
            unit_float(s) / (unit_float(s + 1).max(1e-3))
        })
        .unwrap();
        let got = run_reduce(&ctx, &grid).unwrap();
        assert_eq!(got, grid.max_value(), "extent {extent}");
    }
}

#[test]
#[ignore = "requires a GPU adapter"]
fn mismatched_attachment_dimensions_fail_cleanly() {
    let ctx = gpu();
    let small = NumericGrid::zeroed(2, 2, 1).unwrap();
    let err = RenderTargetSet::create(&ctx, TexelFormat::R32Float, 4, 4, &[None, Some(&small)])
        .unwrap_err();
    assert!(matches!(err, TexflowError::Attachment(_)), "{err}");

    // The device must still be usable afterwards: nothing leaked, nothing
    // poisoned.
    let ok = NumericGrid::zeroed(4, 4, 1).unwrap();
    let targets =
        RenderTargetSet::create(&ctx, TexelFormat::R32Float, 4, 4, &[Some(&ok)]).unwrap();
    targets.read_attachment(&ctx, 0, 4, 4).unwrap();
}

#[test]
#[ignore = "requires a GPU adapter"]
fn unknown_kernel_parameter_is_tolerated() {
    let ctx = gpu();
    let mut kernel = Kernel::builder(&ctx)
        .fragment(texflow::map::LINEAR_MAP_KERNEL)
        .scalar("alpha")
        .texture("texture_y")
        .texture("texture_x")
        .build()
        .unwrap();
    // Logged and ignored, never an error.
    kernel.set_scalar("optimized_out", 42.0);
    kernel.set_scalar("alpha", 0.25);

    let x = NumericGrid::from_fn(2, 2, 1, |_, _, _| 1.0).unwrap();
    let y = NumericGrid::from_fn(2, 2, 1, |_, _, _| 4.0).unwrap();
    let got = run_map(&ctx, &x, &y, 0.25, 1).unwrap();
    for &v in got.as_slice() {
        assert_eq!(v, 2.0);
    }
}

#[test]
#[ignore = "requires a GPU adapter"]
fn bad_kernel_source_reports_compile_error() {
    let ctx = gpu();
    let err = Kernel::builder(&ctx)
        .fragment("@fragment fn fs_main() -> { not wgsl }")
        .build()
        .unwrap_err();
    assert!(matches!(err, TexflowError::Compile(_)), "{err}");
}

#[test]
#[ignore = "requires a GPU adapter"]
fn missing_fragment_stage_reports_link_error() {
    let ctx = gpu();
    let err = Kernel::builder(&ctx).build().unwrap_err();
    assert!(matches!(err, TexflowError::Link(_)), "{err}");
}
