//! Template-Parameter Expansion
//!
//! Catalog declarations leave the pipeline scheduler and the forward
//! specialization as template parameters. Expansion replaces each placeholder
//! with every value of its domain and pins the fields that only have one
//! supported value in this configuration space.

use tracing::debug;

use crate::instance::{ConvInstance, CONV_SPEC_PLACEHOLDER, SCHEDULER_PLACEHOLDER};

/// Domain of the block-GEMM pipeline scheduler
pub const SCHEDULERS: [&str; 2] = [
    "BlockGemmPipelineScheduler::Intrawave",
    "BlockGemmPipelineScheduler::Interwave",
];

/// Domain of the convolution forward specialization
pub const CONV_FORWARD_SPECIALIZATIONS: [&str; 4] = [
    "ConvolutionForwardSpecialization::ConvFwdDefault",
    "ConvolutionForwardSpecialization::ConvFwd1x1P0",
    "ConvolutionForwardSpecialization::ConvFwd1x1S1P0",
    "ConvolutionForwardSpecialization::ConvFwdOddC",
];

/// GEMM specialization that is safe for every problem size
pub const PADDED_GEMM_SPECIALIZATION: &str = "GemmSpecialization::MNKPadding";

/// Spatial rank of every expanded instance
pub const EXPANDED_SPATIAL_DIMS: i64 = 2;

/// Input / weight / output layouts of every expanded instance
pub const EXPANDED_LAYOUTS: (&str, &str, &str) = ("NHWGC", "GKYXC", "NHWGK");

fn domain<'a>(current: &'a str, placeholder: &str, values: &'a [&'a str]) -> Vec<&'a str> {
    if current == placeholder {
        values.to_vec()
    } else {
        vec![current]
    }
}

/// Expand one instance: schedulers outer, specializations inner
#[must_use]
pub fn expand_instance(instance: &ConvInstance) -> Vec<ConvInstance> {
    let schedulers = domain(
        &instance.block_gemm_pipeline_scheduler,
        SCHEDULER_PLACEHOLDER,
        &SCHEDULERS,
    );
    let specs = domain(
        &instance.conv_forward_specialization,
        CONV_SPEC_PLACEHOLDER,
        &CONV_FORWARD_SPECIALIZATIONS,
    );
    let (a_layout, b_layout, e_layout) = EXPANDED_LAYOUTS;

    let mut variants = Vec::with_capacity(schedulers.len() * specs.len());
    for scheduler in &schedulers {
        for spec in &specs {
            variants.push(ConvInstance {
                block_gemm_pipeline_scheduler: (*scheduler).to_string(),
                conv_forward_specialization: (*spec).to_string(),
                gemm_specialization: PADDED_GEMM_SPECIALIZATION.to_string(),
                n_dim_spatial: EXPANDED_SPATIAL_DIMS,
                a_layout: a_layout.to_string(),
                b_layout: b_layout.to_string(),
                e_layout: e_layout.to_string(),
                ..instance.clone()
            });
        }
    }
    variants
}

/// Expand every instance, preserving source order
#[must_use]
pub fn expand_instances(instances: Vec<ConvInstance>) -> Vec<ConvInstance> {
    let source_count = instances.len();
    let expanded: Vec<ConvInstance> = instances.iter().flat_map(expand_instance).collect();
    debug!(
        source = source_count,
        expanded = expanded.len(),
        "expanded templated instances"
    );
    expanded
}
