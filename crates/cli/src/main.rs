//! Stash command-line client.
//!
//! Hashes files locally, negotiates upload sessions, transmits chunks
//! concurrently with retry and resume, and requests the server-side merge.

mod api_client;

use anyhow::{Context, Result};
use api_client::ApiClient;
use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use stash_core::content::InitStatus;
use stash_core::hash::ContentHasher;
use stash_core::DEFAULT_CHUNK_SIZE;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Attempts per chunk before the upload is abandoned.
const CHUNK_RETRIES: u32 = 3;

#[derive(Parser, Debug)]
#[command(name = "stash")]
#[command(version, about = "Client for the stash upload service", long_about = None)]
struct Args {
    /// Server base URL
    #[arg(short, long, env = "STASH_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Bearer token (from `stash login`)
    #[arg(short, long, env = "STASH_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Log in and print a bearer token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Upload a file (resumes and deduplicates automatically)
    Upload {
        /// Path of the file to upload
        path: PathBuf,
        /// Display name; defaults to the file name
        #[arg(long)]
        name: Option<String>,
        /// Chunk size in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,
        /// Parallel chunk uploads
        #[arg(long, default_value_t = 4)]
        parallel: usize,
    },
    /// Download a file by content hash
    Download {
        /// Content hash (32 hex characters)
        hash: String,
        /// Output path
        #[arg(short, long)]
        output: PathBuf,
        /// Optional byte range, e.g. "bytes=0-1048575"
        #[arg(long)]
        range: Option<String>,
    },
    /// List your files
    Ls,
    /// List your contents
    Contents,
    /// Delete a file by content hash
    Rm { hash: String },
    /// Cancel an in-flight upload
    Cancel {
        #[arg(long)]
        content_id: i64,
        #[arg(long)]
        hash: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();
    let client = ApiClient::new(&args.server, args.token.clone())?;

    match args.command {
        Command::Register { username, password } => {
            client.register(&username, &password).await?;
            println!("registered {username}");
        }
        Command::Login { username, password } => {
            let token = client.login(&username, &password).await?;
            println!("{token}");
        }
        Command::Upload {
            path,
            name,
            chunk_size,
            parallel,
        } => {
            upload(&client, &path, name, chunk_size, parallel).await?;
        }
        Command::Download {
            hash,
            output,
            range,
        } => {
            download(&client, &hash, &output, range.as_deref()).await?;
        }
        Command::Ls => {
            for file in client.list_files().await? {
                println!(
                    "{}  {:>12}  status={:>2}  {}  {}",
                    file.file_hash, file.file_size, file.status, file.created_at, file.file_name
                );
            }
        }
        Command::Contents => {
            for content in client.list_contents().await? {
                println!(
                    "{:>6}  {}  {}  {}",
                    content.id, content.source_hash, content.created_at, content.title
                );
            }
        }
        Command::Rm { hash } => {
            client.delete_file(&hash).await?;
            println!("deleted {hash}");
        }
        Command::Cancel { content_id, hash } => {
            client.cancel_upload(content_id, &hash).await?;
            println!("cancelled {hash}");
        }
    }

    Ok(())
}

/// Hash a file without loading it into memory.
async fn hash_file(path: &Path) -> Result<(String, u64)> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = ContentHasher::new();
    let mut size: u64 = 0;
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hasher.finalize().to_string(), size))
}

/// Read one chunk of the file at the given index.
async fn read_chunk(path: &Path, index: u32, chunk_size: u64, file_size: u64) -> Result<Vec<u8>> {
    use tokio::io::{AsyncSeekExt, SeekFrom};

    let offset = index as u64 * chunk_size;
    let len = chunk_size.min(file_size - offset) as usize;

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Upload one chunk with retry.
async fn upload_chunk_with_retry(
    client: &ApiClient,
    path: &Path,
    content_id: i64,
    file_hash: &str,
    index: u32,
    total_chunks: u32,
    chunk_size: u64,
    file_size: u64,
) -> Result<()> {
    let mut last_error = None;
    for attempt in 1..=CHUNK_RETRIES {
        let data = read_chunk(path, index, chunk_size, file_size).await?;
        match client
            .upload_chunk(content_id, file_hash, index, total_chunks, data)
            .await
        {
            Ok(response) => {
                tracing::debug!(index, status = %response.status, "chunk done");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(index, attempt, error = %e, "chunk upload failed");
                last_error = Some(e);
                tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
            }
        }
    }
    Err(last_error.unwrap()).with_context(|| format!("chunk {index} failed after retries"))
}

async fn upload(
    client: &ApiClient,
    path: &Path,
    name: Option<String>,
    chunk_size: u64,
    parallel: usize,
) -> Result<()> {
    let file_name = name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    });

    println!("hashing {}...", path.display());
    let (file_hash, file_size) = hash_file(path).await?;
    anyhow::ensure!(file_size > 0, "refusing to upload an empty file");

    let total_chunks = file_size.div_ceil(chunk_size) as u32;
    let init = client
        .init_upload(&file_name, &file_hash, file_size)
        .await?;

    match init.status {
        InitStatus::FastUpload => {
            println!(
                "fast upload: content {} already stored, no bytes transferred",
                init.content_id
            );
            return Ok(());
        }
        InitStatus::New => {
            println!("uploading {total_chunks} chunks of {chunk_size} bytes");
        }
        InitStatus::Resumable => {
            println!(
                "resuming: {}/{} chunks already uploaded",
                init.uploaded_chunks.len(),
                total_chunks
            );
        }
    }

    let uploaded: HashSet<u32> = init.uploaded_chunks.into_iter().collect();
    let pending: Vec<u32> = (0..total_chunks).filter(|i| !uploaded.contains(i)).collect();

    let results = stream::iter(pending)
        .map(|index| {
            let client = client.clone();
            let path = path.to_path_buf();
            let file_hash = file_hash.clone();
            let content_id = init.content_id;
            async move {
                upload_chunk_with_retry(
                    &client,
                    &path,
                    content_id,
                    &file_hash,
                    index,
                    total_chunks,
                    chunk_size,
                    file_size,
                )
                .await
            }
        })
        .buffer_unordered(parallel.max(1))
        .collect::<Vec<_>>()
        .await;

    for result in results {
        result?;
    }

    let merged = client
        .merge(init.content_id, &file_hash, &file_name, total_chunks, file_size)
        .await?;
    println!(
        "completed: content {} merged ({} bytes)",
        merged.content_id, merged.file_size
    );
    Ok(())
}

async fn download(
    client: &ApiClient,
    hash: &str,
    output: &Path,
    range: Option<&str>,
) -> Result<()> {
    let response = client.download(hash, range).await?;

    let mut file = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("failed to create {}", output.display()))?;

    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("download stream failed")?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    println!("wrote {} bytes to {}", written, output.display());
    Ok(())
}
