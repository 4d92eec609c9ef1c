use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;
use vtt_dice::MarkdownStringifier;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut buf = String::new();
    print!("> ");
    io::stdout().flush()?;
    while let Some(Ok(line)) = lines.next() {
        if line.is_empty() {
            match vtt_dice::roll(buf.trim()).and_then(|r| MarkdownStringifier::new().stringify(&r)) {
                Ok(r) => println!("{}", r),
                Err(why) => eprintln!("Error: {}", why),
            }
            print!("> ");
            io::stdout().flush()?;
            buf.clear();
        } else {
            buf.push_str(&line);
            buf.push('\n');
            print!("... ");
            io::stdout().flush()?;
        }
    }
    Ok(())
}
