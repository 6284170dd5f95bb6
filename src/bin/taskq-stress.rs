use clap::Parser;
use slog::{o, info, Drain, Logger};
use std::process::exit;
use std::time::Instant;
use taskq::{Result, TaskQueue};

#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        author = env!("CARGO_PKG_AUTHORS"),
        about = env!("CARGO_PKG_DESCRIPTION"))]
struct Cli {
    /// 工作线程数
    #[arg(long, default_value_t = num_cpus::get() as u32)]
    threads: u32,

    /// 派发的任务总数
    #[arg(long, default_value_t = 10_000)]
    tasks: usize,

    /// 任务记录预留下限
    #[arg(long, default_value_t = 0)]
    min_alloc: usize,

    /// 任务记录数量上限
    #[arg(long, default_value_t = 1024)]
    max_alloc: usize,

    /// 创建时预分配min_alloc条记录
    #[arg(long)]
    prepopulate: bool,
}

fn main() {
    let cli = Cli::parse();

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let logger = Logger::root(drain, o!());

    if let Err(e) = run(cli, &logger) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli, logger: &Logger) -> Result<()> {
    let queue = TaskQueue::new(
        "stress",
        cli.threads,
        cli.min_alloc,
        cli.max_alloc,
        cli.prepopulate,
        logger.clone(),
    )?;

    let (done_tx, done_rx) = crossbeam_channel::unbounded();

    let start = Instant::now();
    for i in 0..cli.tasks {
        let done_tx = done_tx.clone();
        queue.dispatch(move || {
            done_tx.send(i).expect("completion channel closed");
        })?;
    }
    queue.wait();
    let elapsed = start.elapsed();
    drop(done_tx);

    let completed = done_rx.try_iter().count();
    info!(logger, "Stress run finished";
          "threads" => cli.threads,
          "tasks" => completed,
          "allocated" => queue.allocated(),
          "elapsed_ms" => elapsed.as_millis() as u64);

    println!("completed {} tasks in {:?}", completed, elapsed);
    Ok(())
}
