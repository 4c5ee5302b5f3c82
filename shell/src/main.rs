//! Interactive shell over a mounted filesystem image: a thin REPL dispatching
//! each line's command verb onto `fscore::Filesystem`.

use std::io::{self, BufRead, Write as _};

use clap::Parser;
use fscore::descriptor::Tag;
use fscore::Filesystem;

#[derive(Parser, Debug)]
#[command(about = "Interactive shell for a single-file descriptor filesystem image")]
struct Args {
    /// Path to an already-formatted image
    image: String,
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

fn tag_char(tag: Tag) -> char {
    match tag {
        Tag::Dir => 'd',
        Tag::Regular => 'r',
        Tag::Symlink => 's',
        Tag::Free => '-',
    }
}

const HELP: &str = "\
mkfs n              format the mounted image with n descriptors
ls                  list directory entries
create name         create an empty regular file
link src dst        create a hard link dst -> src
unlink name         remove a name, freeing the file if it was the last link
stat path           print id, type, nlink, size, nblock
truncate path size  grow or shrink a file to size bytes
open path           open a file, prints its fd
close fd            close a file descriptor
read fd n           read n bytes from the current offset
write fd n          read a line from you, trim to n bytes, write at offset
seek fd pos         set the offset for a descriptor
symlink target name create a symbolic link name -> target
help                show this text
exit                leave the shell";

fn main() {
    init_logger();
    let args = Args::parse();

    let mut fs = match Filesystem::mount(&args.image) {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("fsh: could not mount '{}': {}", args.image, e);
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut lines = stdin.lock().lines();

    loop {
        print!("fsh> ");
        let _ = stdout.flush();
        let Some(Ok(line)) = lines.next() else {
            break;
        };
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            continue;
        };
        let rest: Vec<&str> = words.collect();

        match cmd {
            "exit" => break,
            "help" => println!("{}", HELP),
            "mkfs" => match rest.first().and_then(|n| n.parse().ok()) {
                Some(n) => match Filesystem::format(&args.image, n) {
                    Ok(reformatted) => fs = reformatted,
                    Err(e) => eprintln!("mkfs: {}", e),
                },
                None => eprintln!("usage: mkfs n"),
            },
            "ls" => {
                for (name, index, tag) in fs.ls() {
                    println!("{} {} {}", tag_char(tag), index, name);
                }
            }
            "create" => match rest.first() {
                Some(name) => match fs.create(name) {
                    Ok(index) => println!("{}", index),
                    Err(e) => eprintln!("create: {}", e),
                },
                None => eprintln!("usage: create name"),
            },
            "link" => match (rest.first(), rest.get(1)) {
                (Some(src), Some(dst)) => {
                    if let Err(e) = fs.link(src, dst) {
                        eprintln!("link: {}", e);
                    }
                }
                _ => eprintln!("usage: link src dst"),
            },
            "unlink" => match rest.first() {
                Some(name) => {
                    if let Err(e) = fs.unlink(name) {
                        eprintln!("unlink: {}", e);
                    }
                }
                None => eprintln!("usage: unlink name"),
            },
            "stat" => match rest.first() {
                Some(name) => match fs.stat(name) {
                    Ok(s) => println!(
                        "{} {} {} {} {}",
                        s.index,
                        tag_char(s.tag),
                        s.nlink,
                        s.size,
                        s.nblock
                    ),
                    Err(e) => eprintln!("stat: {}", e),
                },
                None => eprintln!("usage: stat path"),
            },
            "truncate" => match (rest.first(), rest.get(1).and_then(|s| s.parse().ok())) {
                (Some(name), Some(size)) => {
                    if let Err(e) = fs.truncate(name, size) {
                        eprintln!("truncate: {}", e);
                    }
                }
                _ => eprintln!("usage: truncate path size"),
            },
            "open" => match rest.first() {
                Some(name) => match fs.open(name) {
                    Ok(fd) => println!("{}", fd),
                    Err(e) => eprintln!("open: {}", e),
                },
                None => eprintln!("usage: open path"),
            },
            "close" => match rest.first().and_then(|s| s.parse().ok()) {
                Some(fd) => {
                    if let Err(e) = fs.close(fd) {
                        eprintln!("close: {}", e);
                    }
                }
                None => eprintln!("usage: close fd"),
            },
            "read" => match (
                rest.first().and_then(|s| s.parse().ok()),
                rest.get(1).and_then(|s| s.parse().ok()),
            ) {
                (Some(fd), Some(n)) => match fs.read(fd, n) {
                    Ok(data) => println!("{}", String::from_utf8_lossy(&data)),
                    Err(e) => eprintln!("read: {}", e),
                },
                _ => eprintln!("usage: read fd n"),
            },
            "write" => match (
                rest.first().and_then(|s| s.parse().ok()),
                rest.get(1).and_then(|s| s.parse().ok()),
            ) {
                (Some(fd), Some(n)) => {
                    let text = match lines.next() {
                        Some(Ok(text)) => text,
                        _ => String::new(),
                    };
                    if let Err(e) = fs.write(fd, n, &text) {
                        eprintln!("write: {}", e);
                    }
                }
                _ => eprintln!("usage: write fd n (then type the line to write)"),
            },
            "seek" => match (
                rest.first().and_then(|s| s.parse().ok()),
                rest.get(1).and_then(|s| s.parse().ok()),
            ) {
                (Some(fd), Some(pos)) => {
                    if let Err(e) = fs.seek(fd, pos) {
                        eprintln!("seek: {}", e);
                    }
                }
                _ => eprintln!("usage: seek fd pos"),
            },
            "symlink" => match (rest.first(), rest.get(1)) {
                (Some(target), Some(name)) => {
                    if let Err(e) = fs.symlink(target, name) {
                        eprintln!("symlink: {}", e);
                    }
                }
                _ => eprintln!("usage: symlink target name"),
            },
            other => eprintln!("fsh: unknown command '{}' (try 'help')", other),
        }
    }
}
