//! Formats a fresh filesystem image: allocates a zero-filled host file of
//! the requested size, then lays out the superblock, hard-link table,
//! descriptor table and bitmap via `fscore`.

use std::io::Write as _;
use std::process::ExitCode;

use clap::Parser;
use fscore::image::Image;
use fscore::Filesystem;

#[derive(Parser, Debug)]
#[command(about = "Format a single-file descriptor filesystem image")]
struct Args {
    /// Path of the image file to create
    #[arg(short, long)]
    image: String,

    /// Number of descriptor-table slots
    #[arg(short, long, default_value_t = 64)]
    descriptors: usize,

    /// Total image size in bytes
    #[arg(short, long)]
    size: u64,
}

fn init_logger() {
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = match record.level() {
                log::Level::Info => "INFO",
                _ => "FAIL",
            };
            writeln!(buf, "{}: {}", level, record.args())
        })
        .init();
}

fn main() -> ExitCode {
    init_logger();
    let args = Args::parse();

    if let Err(e) = Image::create_sized(&args.image, args.size) {
        eprintln!("mkfs-sim: could not allocate '{}': {}", args.image, e);
        return ExitCode::FAILURE;
    }

    match Filesystem::format(&args.image, args.descriptors) {
        Ok(_) => {
            println!("formatted '{}' ({} bytes, {} descriptors)", args.image, args.size, args.descriptors);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("mkfs-sim: {}", e);
            ExitCode::FAILURE
        }
    }
}
