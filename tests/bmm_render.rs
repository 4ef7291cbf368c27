//! Rendered batched matmul source and weight packing
//!
//! Checks the generated wrapper against the loop split it is supposed to
//! implement, across dtypes, thread counts and static or dynamic shapes.

use proptest::prelude::*;

use templar::codegen::weights::{pack_weight, WeightDims};
use templar::codegen::{BatchSplit, Epilogue, GemmBlocking, LayoutType, MicroGemm};
use templar::{BmmTemplate, CppKernel, DataType, Dim, JinjaEngine, TensorDesc};

fn operands(dtype: DataType, batch: Dim, m: Dim, k: i64, n: i64, bias: bool) -> (Vec<TensorDesc>, TensorDesc) {
    let x = TensorDesc::contiguous("arg0_1", dtype, vec![batch.clone(), m.clone(), k.into()]);
    let w = TensorDesc::contiguous("arg1_1", dtype, vec![batch.clone(), k.into(), n.into()]);
    let y = TensorDesc::contiguous("buf0", dtype, vec![batch, m, n.into()]);
    let mut inputs = vec![x, w];
    if bias {
        inputs.push(TensorDesc::contiguous("arg2_1", dtype, vec![n.into()]));
    }
    (inputs, y)
}

fn wrapper_of(src: &str) -> &str {
    &src[src.find("extern \"C\"").unwrap()..]
}

#[test]
fn test_int8_vnni4_with_bias_and_epilogue() {
    let (inputs, out) = operands(DataType::I8, 6.into(), 16.into(), 64, 40, true);
    let template = BmmTemplate::new(&inputs, &out, 3, None, true)
        .unwrap()
        .with_epilogue_creator(Box::new(Epilogue::relu));
    assert_eq!(template.micro_gemm().b_layout(), LayoutType::Vnni4);
    assert_eq!(template.micro_gemm().compute_dtype(), DataType::I32);

    let src = template
        .render(&CppKernel::new("kernel_i8"), &JinjaEngine::new(), None)
        .unwrap();
    assert!(src.contains("int kernel_i8(const int8_t* BX, const int8_t* BW, const int8_t* inp, int8_t* BY)"));
    assert!(src.contains("alignas(64) int32_t local_acc"));
    assert!(src.contains("std::max(x, static_cast<int32_t>(0))"));
    assert!(src.contains("k % 4"));

    let wrapper = wrapper_of(&src);
    assert!(wrapper.contains("const int64_t B_single_thread_block = 6;"));
    // blocked weight is [6, 2, 64, 32]
    assert!(wrapper.contains("&BW[b_start * 4096]"));
    assert!(wrapper.contains("&BX[b_start * 1024]"));
    assert!(wrapper.contains("&BY[b_start * 640]"));
}

#[test]
fn test_custom_register_blocking() {
    let (inputs, out) = operands(DataType::F32, 2.into(), 8.into(), 8, 8, false);
    let blocking = GemmBlocking {
        block_m: 2,
        block_n: 8,
        block_k: 1,
    };
    let template = BmmTemplate::new(&inputs, &out, 1, Some(blocking), false).unwrap();
    assert_eq!(template.micro_gemm().register_blocking(), blocking);

    let src = template
        .render(&CppKernel::new("k"), &JinjaEngine::new(), None)
        .unwrap();
    assert!(src.contains("constexpr int64_t Mr = 2;"));
    assert!(src.contains("constexpr int64_t Nr = 8;"));
}

#[test]
fn test_rendering_is_deterministic() {
    let (inputs, out) = operands(DataType::F16, "s1".into(), "s0".into(), 32, 64, true);
    let template = BmmTemplate::new(&inputs, &out, 4, None, true).unwrap();
    let kernel = CppKernel::new("k");
    let engine = JinjaEngine::new();
    let first = template.render(&kernel, &engine, None).unwrap();
    let second = template.render(&kernel, &engine, None).unwrap();
    assert_eq!(first, second);
}

fn static_blocks() -> impl Strategy<Value = (i64, usize)> {
    (0i64..200, 1usize..17)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Parallel and serial loops cover every batch index exactly once
    #[test]
    fn prop_split_partitions_batch((batch, threads) in static_blocks()) {
        let split = BatchSplit::new(batch, threads);
        let mut covered: Vec<i64> = split.parallel_range().into_iter().flatten().collect();
        covered.extend(split.serial_range());
        prop_assert_eq!(covered, (0..batch).collect::<Vec<_>>());

        if threads > 1 {
            prop_assert_eq!(split.single_thread_block % threads as i64, 0);
            prop_assert!(split.serial_range().count() < threads);
        } else {
            prop_assert!(split.parallel_range().is_none());
        }
    }

    /// The wrapper's constant matches the split for every static batch
    #[test]
    fn prop_wrapper_renders_split((batch, threads) in (1i64..64, 1usize..9)) {
        let (inputs, out) = operands(DataType::F32, batch.into(), 4.into(), 8, 16, false);
        let template = BmmTemplate::new(&inputs, &out, threads, None, false).unwrap();
        let src = template
            .render(&CppKernel::new("k"), &JinjaEngine::new(), None)
            .unwrap();
        let wrapper = wrapper_of(&src);

        let expected = BatchSplit::new(batch, threads).single_thread_block;
        if threads > 1 {
            let constant = format!("const int64_t B_single_thread_block = {expected};");
            prop_assert!(wrapper.contains(&constant));
            prop_assert!(wrapper.contains("#pragma omp parallel for"));
        } else {
            prop_assert!(!wrapper.contains("#pragma omp"));
        }
        let b_const = format!("const int64_t B = {batch};");
        prop_assert!(wrapper.contains(&b_const));
    }

    /// Every logical weight element lands in exactly one packed slot
    #[test]
    fn prop_vnni_pack_is_a_permutation_plus_padding(
        batch in 1usize..3,
        k_groups in 1usize..5,
        n in 1usize..70,
        dtype in prop_oneof![Just(DataType::BF16), Just(DataType::U8)],
    ) {
        let mg = MicroGemm::select(dtype).unwrap();
        let vnni = mg.b_layout().vnni_size() as usize;
        let block_n = mg.register_blocking().block_n as usize;
        let k = k_groups * vnni;
        let data: Vec<u32> = (1..=(batch * k * n) as u32).collect();

        let packed = pack_weight(&data, WeightDims { batch, k, n }, &mg).unwrap();
        let padded = n.div_ceil(block_n) * block_n;
        prop_assert_eq!(packed.len(), batch * k * padded);

        let mut nonzero: Vec<u32> = packed.iter().copied().filter(|&v| v != 0).collect();
        nonzero.sort_unstable();
        prop_assert_eq!(nonzero, data);
    }
}
