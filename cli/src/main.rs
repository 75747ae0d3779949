use clap::Parser;
use dotroute_cli::{run, Args};
use dotroute_tracing::TracingBuilder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut tracing_builder = TracingBuilder::default().level(args.log_level);
    if args.progress {
        tracing_builder = tracing_builder.enable_progressbar();
    }
    let tracing_handle = tracing_builder.build()?;

    let result = run(&args, &mut tracing_handle.get_stdout_writer()).await;
    tracing_handle.shutdown()?;

    Ok(result?)
}
