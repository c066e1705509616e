//! A small command-line tool for inspecting, extracting, and creating
//! cabinet files, built on top of `cabinet_engine`.

use cabinet_engine::{Cabinet, CabinetBuilder, CompressionType, FileEntry, FolderEntry};
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

#[derive(Parser)]
#[command(name = "cabtool", version, about = "Manipulates CAB files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Concatenates and prints the contents of one or more files
    Cat { cab: PathBuf, file: Vec<String> },
    /// Creates a new cabinet from a list of files
    Create {
        /// Compression type: none, mszip, quantum, or lzx
        #[arg(short, long, value_name = "TYPE", default_value = "mszip")]
        compress: String,
        /// Output path (defaults to out.cab, out1.cab, ...)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        file: Vec<String>,
    },
    /// Lists the files in the cabinet
    Ls {
        /// Lists in long format
        #[arg(short)]
        long: bool,
        cab: PathBuf,
    },
    /// Scans a file for embedded cabinet signatures
    Search {
        /// Tolerate minor header inconsistencies
        #[arg(long)]
        salvage: bool,
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Cat { cab, file } => cmd_cat(&cab, &file),
        Command::Create { compress, output, file } => {
            cmd_create(&compress, output, &file)
        }
        Command::Ls { long, cab } => cmd_ls(&cab, long),
        Command::Search { salvage, file } => cmd_search(&file, salvage),
    }
}

fn cmd_cat(cab_path: &PathBuf, filenames: &[String]) -> anyhow::Result<()> {
    let mut cabinet = open_cab(cab_path)?;
    for filename in filenames {
        let mut file_reader = cabinet.read_file(filename)?;
        io::copy(&mut file_reader, &mut io::stdout())?;
    }
    Ok(())
}

fn cmd_create(
    compress: &str,
    output: Option<PathBuf>,
    filenames: &[String],
) -> anyhow::Result<()> {
    let ctype = match compress.to_lowercase().as_str() {
        "none" => CompressionType::None,
        "mszip" => CompressionType::MsZip,
        "quantum" => CompressionType::Quantum(3, 16),
        "lzx" => CompressionType::Lzx(16),
        other => anyhow::bail!("Invalid compression type: {}", other),
    };
    let out_path = output.unwrap_or_else(default_output_path);
    let mut builder = CabinetBuilder::new();
    let mut file_index = 0;
    while file_index < filenames.len() {
        let folder = builder.add_folder(ctype);
        let mut folder_size: u64 = 0;
        while file_index < filenames.len() && folder_size < 0x8000 {
            let filename = &filenames[file_index];
            let metadata = fs::metadata(filename)?;
            folder_size += metadata.len();
            let file = folder.add_file(filename.as_str());
            if let Ok(modified) = metadata.modified() {
                if let Ok(duration) = modified.duration_since(UNIX_EPOCH) {
                    let instant = time::OffsetDateTime::UNIX_EPOCH
                        + time::Duration::seconds(duration.as_secs() as i64);
                    file.set_datetime(time::PrimitiveDateTime::new(
                        instant.date(),
                        instant.time(),
                    ));
                }
            }
            file_index += 1;
        }
    }
    let file = File::create(&out_path)?;
    let mut cabinet = builder.build(file)?;
    while let Some(mut writer) = cabinet.next_file()? {
        let mut source = File::open(writer.file_name())?;
        io::copy(&mut source, &mut writer)?;
    }
    cabinet.finish()?;
    Ok(())
}

fn default_output_path() -> PathBuf {
    let mut path = PathBuf::from("out.cab");
    let mut index: i32 = 0;
    while path.exists() {
        index += 1;
        path = PathBuf::from(format!("out{}.cab", index));
    }
    path
}

fn cmd_ls(cab_path: &PathBuf, long: bool) -> anyhow::Result<()> {
    let cabinet = open_cab(cab_path)?;
    for (index, folder) in cabinet.folder_entries().enumerate() {
        for file in folder.file_entries() {
            list_file(index, folder, file, long);
        }
    }
    Ok(())
}

fn cmd_search(path: &PathBuf, salvage: bool) -> anyhow::Result<()> {
    let file = File::open(path)?;
    let mut options = cabinet_engine::SearchOptions::default();
    options.set_salvage(salvage);
    let found = cabinet_engine::search(file, options)?;
    for candidate in found {
        println!(
            "offset {:>10}  length {:>10}",
            candidate.offset, candidate.length
        );
    }
    Ok(())
}

fn list_file(
    folder_index: usize,
    folder: &FolderEntry,
    file: &FileEntry,
    long: bool,
) {
    if !long {
        println!("{}", file.name());
        return;
    }
    let ctype = match folder.compression_type() {
        CompressionType::None => "None".to_string(),
        CompressionType::MsZip => "MsZip".to_string(),
        CompressionType::Quantum(v, m) => format!("Q{}/{}", v, m),
        CompressionType::Lzx(w) => format!("Lzx{}", w),
    };
    let file_size = if file.uncompressed_size() >= 100_000_000 {
        format!("{} MB", file.uncompressed_size() / (1 << 20))
    } else if file.uncompressed_size() >= 1_000_000 {
        format!("{} kB", file.uncompressed_size() / (1 << 10))
    } else {
        format!("{} B ", file.uncompressed_size())
    };
    println!(
        "{}{}{}{}{}{} {:>2} {:<7} {:>10} {} {}",
        if file.is_read_only() { 'R' } else { '-' },
        if file.is_hidden() { 'H' } else { '-' },
        if file.is_system() { 'S' } else { '-' },
        if file.is_archive() { 'A' } else { '-' },
        if file.is_exec() { 'E' } else { '-' },
        if file.is_name_utf() { 'U' } else { '-' },
        folder_index,
        ctype,
        file_size,
        file.datetime()
            .map(|dt| dt.to_string())
            .unwrap_or_else(|| "invalid datetime".to_string()),
        file.name()
    );
}

fn open_cab(path: &PathBuf) -> anyhow::Result<Cabinet<File>> {
    Ok(Cabinet::new(File::open(path)?)?)
}
