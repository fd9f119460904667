use anyhow::Result;
use log::debug;
use std::process::ExitCode;
use vllm_bench::BenchCli;

fn main() -> Result<ExitCode> {
    // Parse CLI arguments and merge them over the optional config file
    let config = BenchCli::parse_args().into_config()?;

    vllm_bench::logging::init(&config.log)?;
    debug!("Resolved configuration: {:?}", config);

    // Build custom tokio runtime with specified worker threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.runtime.worker_threads)
        .enable_all()
        .build()?;

    let completed = runtime.block_on(vllm_bench::benchmark::run_benchmark(&config))?;
    log::logger().flush();

    Ok(if completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
