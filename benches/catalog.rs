//! Benchmarks for the instance pipeline and kernel rendering
//!
//! Catalog sizes mirror real CK instance headers (tens to a few hundred
//! declarations per dtype).

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use templar::catalog::parse_instances;
use templar::expand::expand_instances;
use templar::select::choose_instances;
use templar::{BmmTemplate, CppKernel, DataType, Dim, JinjaEngine, OperandTypes, TensorDesc};

const TEMPLATED: &str = "        DeviceGroupedConvFwdMultipleABD_Xdl_CShuffle_V3<NDimSpatial,ALayout,BLayout, DsLayout,ELayout, F16, F16, F32, F16, Tuple<>, F16, PassThrough, PassThrough, PassThrough, ConvSpec, GemmMNKPadding,   256,   128,   128,    32,   8,   8,   32,   32,    2,    2,  S<4, 64, 1>,  S<1, 0, 2>,  S<1, 0, 2>,              2,              8,              8,          0,  S<4, 64, 1>,  S<1, 0, 2>,  S<1, 0, 2>,             2,              8,              8,          0,          1,           1,                   S<1, 32, 1, 8>,               8, BlkGemmPipeSched, BlockGemmPipelineVersion::v3>,";

fn catalog(lines: usize) -> Vec<String> {
    (0..lines)
        .map(|i| {
            let dtype = if i % 2 == 0 { "F16" } else { "BF16" };
            TEMPLATED.replace(
                "F16, F16, F32, F16, Tuple<>, F16",
                &format!("{dtype}, {dtype}, F32, {dtype}, Tuple<>, {dtype}"),
            )
        })
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_parse");

    for size in [10, 100, 500] {
        let lines = catalog(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &lines, |b, lines| {
            b.iter(|| parse_instances(black_box(lines).iter().map(String::as_str)).unwrap());
        });
    }

    group.finish();
}

fn bench_expand_and_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_expand_select");
    let types = OperandTypes::new(DataType::F16, DataType::F16, DataType::F16);

    for size in [10, 100, 500] {
        let parsed = parse_instances(catalog(size).iter().map(String::as_str)).unwrap();
        group.bench_with_input(BenchmarkId::new("expand", size), &parsed, |b, parsed| {
            b.iter(|| expand_instances(black_box(parsed.clone())));
        });

        let library = expand_instances(parsed);
        group.bench_with_input(BenchmarkId::new("choose_16", size), &library, |b, library| {
            b.iter(|| choose_instances(black_box(library), &types, Some(16)));
        });
    }

    group.finish();
}

fn bench_bmm_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("bmm_render");
    let engine = JinjaEngine::new();
    let kernel = CppKernel::new("bmm_kernel");

    for dtype in [DataType::F32, DataType::BF16, DataType::I8] {
        let b = Dim::Static(16);
        let x = TensorDesc::contiguous("arg0", dtype, vec![b.clone(), "s0".into(), 256.into()]);
        let w = TensorDesc::contiguous("arg1", dtype, vec![b.clone(), 256.into(), 512.into()]);
        let y = TensorDesc::contiguous("buf0", dtype, vec![b, "s0".into(), 512.into()]);
        let template = BmmTemplate::new(&[x, w], &y, 8, None, false).unwrap();

        group.bench_function(BenchmarkId::from_parameter(dtype), |bench| {
            bench.iter(|| template.render(black_box(&kernel), &engine, None).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_expand_and_select, bench_bmm_render);
criterion_main!(benches);
