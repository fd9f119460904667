use anyhow::Result;
use std::process::ExitCode;
use vllm_bench::SmokeCli;

fn main() -> Result<ExitCode> {
    let config = SmokeCli::parse_args().into_config()?;

    vllm_bench::logging::init(&config.log)?;

    // Prompts run one at a time; a small runtime is enough
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.runtime.worker_threads.min(2))
        .enable_all()
        .build()?;

    let passed = runtime.block_on(vllm_bench::smoke::run_smoke_test(&config))?;
    log::logger().flush();

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
