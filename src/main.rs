use logtail::{tail_file, Options};
use std::env;
use std::io::Write;
use std::process;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <file_path>", args[0]);
        process::exit(1);
    }

    let file_path = &args[1];

    let mut tail = match tail_file(file_path, Options::default()).await {
        Ok(tail) => tail,
        Err(e) => {
            eprintln!("Error setting up tail: {}", e);
            process::exit(1);
        }
    };

    let mut stdout = std::io::stdout();
    let mut errors_open = true;
    loop {
        tokio::select! {
            line = tail.lines.recv() => match line {
                Some(line) => {
                    // Lines are raw bytes; write them through verbatim.
                    if stdout
                        .write_all(&line.text)
                        .and_then(|_| stdout.flush())
                        .is_err()
                    {
                        break;
                    }
                }
                None => break,
            },
            error = tail.errors.recv(), if errors_open => match error {
                Some(e) => eprintln!("Error while tailing: {}", e),
                None => errors_open = false,
            },
        }
    }
}
