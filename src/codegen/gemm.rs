//! Single-Item GEMM Body
//!
//! Function body shared by both batched drivers. It computes
//! `Y = epilogue(alpha * X @ W + beta * inp)` for one `[M, K] x [K, N]`
//! item, tiling M and N by the microkernel's register blocking. With
//! `num_threads > 1` the tile loops form one OpenMP parallel region.

/// Single-item GEMM body, appended to a driver signature stub
pub const GEMM_TEMPLATE: &str = r"
{
    {%- if is_dynamic_M %}
    const int64_t M = {{M}};
    {%- else %}
    constexpr int64_t M = {{M}};
    {%- endif %}
    constexpr int64_t N = {{N}};
    constexpr int64_t K = {{K}};
    constexpr int64_t Mr = {{micro_gemm.block_m}};
    constexpr int64_t Nr = {{micro_gemm.block_n}};
    constexpr int64_t Nr_blocks = (N + Nr - 1) / Nr;
    const int64_t Mr_blocks = (M + Mr - 1) / Mr;
    {%- if num_threads > 1 %}
    #pragma omp parallel for collapse(2) num_threads({{num_threads}})
    {%- endif %}
    for (int64_t mb = 0; mb < Mr_blocks; ++mb) {
        for (int64_t nb = 0; nb < Nr_blocks; ++nb) {
            const int64_t m_start = mb * Mr;
            const int64_t m_size = std::min(Mr, M - m_start);
            const int64_t n_start = nb * Nr;
            const int64_t n_size = std::min(Nr, N - n_start);
            alignas(64) {{micro_gemm.compute_t}} local_acc[Mr * Nr];
            {{micro_gemm.name}}<false>(
                &X[m_start * {{lda}}],
                {%- if should_block_weights %}
                &W[nb * K * Nr],
                {%- else %}
                &W[n_start],
                {%- endif %}
                local_acc,
                m_size,
                n_size,
                K,
                {{lda}},
                {{ldb}},
                Nr
            );
            for (int64_t m = 0; m < m_size; ++m) {
                for (int64_t n = 0; n < n_size; ++n) {
                    {{micro_gemm.compute_t}} x = {% if alpha != 1 %}{{alpha}} * {% endif %}local_acc[m * Nr + n];
                    {%- if has_bias %}
                    x += {% if beta != 1 %}{{beta}} * {% endif %}static_cast<{{micro_gemm.compute_t}}>(inp[n_start + n]);
                    {%- endif %}
                    Y[(m_start + m) * {{ldy}} + n_start + n] = static_cast<{{Y_dtype}}>({{epilogue}});
                }
            }
        }
    }
}
";
