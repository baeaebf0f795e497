//! Checkpoint storage for evolved genomes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use crate::compute::network::NetworkGenome;
use crate::schema::{Activation, LoadStrategy, NetworkConfig};

use super::codec::{self, CodecError};
use super::genome::GenomeRng;
use super::population::CheckpointRequest;

/// Checkpoint storage errors.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("No checkpoint tagged '{tag}' in {dir}")]
    NoCheckpoint { tag: String, dir: PathBuf },
    #[error("Checkpoint writer has shut down")]
    WriterClosed,
}

/// A checkpoint file found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointEntry {
    pub path: PathBuf,
    pub generation: usize,
    pub fitness: f32,
    pub modified: SystemTime,
}

/// File name for a best-genome checkpoint.
pub fn checkpoint_filename(tag: &str, generation: usize, fitness: f32) -> String {
    format!("{tag}_gen{generation}_fit{fitness:.2}.json")
}

/// File name for a population snapshot.
pub fn population_filename(generation: usize) -> String {
    format!("population_gen{generation}.json")
}

/// Recover `(generation, fitness)` from a checkpoint file name.
pub fn parse_checkpoint_filename(tag: &str, name: &str) -> Option<(usize, f32)> {
    let rest = name
        .strip_prefix(tag)?
        .strip_prefix("_gen")?
        .strip_suffix(".json")?;
    let (generation, fitness) = rest.split_once("_fit")?;
    let generation = generation.parse().ok()?;
    let fitness: f32 = fitness.parse().ok()?;
    fitness.is_finite().then_some((generation, fitness))
}

/// Directory of tagged checkpoint files.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    tag: String,
}

impl CheckpointStore {
    /// Open a store, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P, tag: impl Into<String>) -> Result<Self, ArchiveError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            tag: tag.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Write a genome under its provenance file name.
    pub fn save_best(
        &self,
        genome: &NetworkGenome,
        generation: usize,
    ) -> Result<PathBuf, ArchiveError> {
        let path = self
            .dir
            .join(checkpoint_filename(&self.tag, generation, genome.fitness));
        write_atomic(&path, &codec::encode(genome)?)?;
        log::info!("Saved checkpoint {}", path.display());
        Ok(path)
    }

    /// Write the whole population as a JSON array.
    pub fn save_population(
        &self,
        genomes: &[NetworkGenome],
        generation: usize,
    ) -> Result<PathBuf, ArchiveError> {
        let path = self.dir.join(population_filename(generation));
        write_atomic(&path, &codec::encode_population(genomes)?)?;
        log::debug!("Saved population snapshot {}", path.display());
        Ok(path)
    }

    /// Read a population snapshot.
    pub fn load_population(
        &self,
        generation: usize,
        activation: Activation,
    ) -> Result<Vec<NetworkGenome>, ArchiveError> {
        let text = fs::read_to_string(self.dir.join(population_filename(generation)))?;
        Ok(codec::decode_population(&text, activation)?)
    }

    /// All checkpoint files carrying this store's tag.
    pub fn list(&self) -> Result<Vec<CheckpointEntry>, ArchiveError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some((generation, fitness)) = name
                .to_str()
                .and_then(|n| parse_checkpoint_filename(&self.tag, n))
            else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push(CheckpointEntry {
                path: entry.path(),
                generation,
                fitness,
                modified,
            });
        }
        Ok(entries)
    }

    /// Pick a checkpoint according to `strategy`.
    pub fn select(&self, strategy: LoadStrategy) -> Result<CheckpointEntry, ArchiveError> {
        let entries = self.list()?;
        let chosen = match strategy {
            LoadStrategy::MostRecent => entries
                .into_iter()
                .max_by(|a, b| (a.modified, a.generation).cmp(&(b.modified, b.generation))),
            LoadStrategy::HighestFitness => entries.into_iter().max_by(|a, b| {
                a.fitness
                    .total_cmp(&b.fitness)
                    .then(a.generation.cmp(&b.generation))
            }),
        };
        chosen.ok_or_else(|| ArchiveError::NoCheckpoint {
            tag: self.tag.clone(),
            dir: self.dir.clone(),
        })
    }

    /// Load the selected checkpoint, failing on any decode problem.
    pub fn load(
        &self,
        strategy: LoadStrategy,
        activation: Activation,
    ) -> Result<NetworkGenome, ArchiveError> {
        let entry = self.select(strategy)?;
        let text = fs::read_to_string(&entry.path)?;
        Ok(codec::decode(&text, activation)?)
    }

    /// Load the selected checkpoint for use with `network`.
    ///
    /// Only a missing checkpoint or an unreadable file is an error; a
    /// malformed or incompatible document yields a random genome.
    pub fn load_or_random(
        &self,
        strategy: LoadStrategy,
        network: &NetworkConfig,
        rng: &mut GenomeRng,
    ) -> Result<NetworkGenome, ArchiveError> {
        let entry = self.select(strategy)?;
        let text = fs::read_to_string(&entry.path)?;
        log::info!("Loading checkpoint {}", entry.path.display());
        Ok(codec::decode_or_random(&text, network, rng))
    }
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

enum WriteJob {
    Best(CheckpointRequest),
    Population {
        generation: usize,
        genomes: Vec<NetworkGenome>,
    },
    Flush(Sender<()>),
}

/// Background thread persisting checkpoints off the evaluation loop.
///
/// Submissions never block. Write failures are logged and do not stop the
/// writer. Dropping the writer drains the queue and joins the thread.
pub struct CheckpointWriter {
    sender: Option<Sender<WriteJob>>,
    handle: Option<JoinHandle<()>>,
    store: CheckpointStore,
}

impl CheckpointWriter {
    pub fn new(store: CheckpointStore) -> Result<Self, ArchiveError> {
        let (sender, receiver) = mpsc::channel();
        let worker_store = store.clone();
        let handle = thread::Builder::new()
            .name("checkpoint-writer".into())
            .spawn(move || run_writer(worker_store, receiver))?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            store,
        })
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Queue a best-genome checkpoint.
    pub fn submit(&self, request: CheckpointRequest) -> Result<(), ArchiveError> {
        self.send(WriteJob::Best(request))
    }

    /// Queue a population snapshot.
    pub fn submit_population(
        &self,
        genomes: Vec<NetworkGenome>,
        generation: usize,
    ) -> Result<(), ArchiveError> {
        self.send(WriteJob::Population {
            generation,
            genomes,
        })
    }

    /// Block until every job queued so far has been written.
    pub fn flush(&self) -> Result<(), ArchiveError> {
        let (done_tx, done_rx) = mpsc::channel();
        self.send(WriteJob::Flush(done_tx))?;
        done_rx.recv().map_err(|_| ArchiveError::WriterClosed)
    }

    fn send(&self, job: WriteJob) -> Result<(), ArchiveError> {
        self.sender
            .as_ref()
            .ok_or(ArchiveError::WriterClosed)?
            .send(job)
            .map_err(|_| ArchiveError::WriterClosed)
    }
}

impl Drop for CheckpointWriter {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Checkpoint writer thread panicked");
        }
    }
}

fn run_writer(store: CheckpointStore, jobs: Receiver<WriteJob>) {
    for job in jobs {
        match job {
            WriteJob::Best(request) => {
                if let Err(e) = store.save_best(&request.genome, request.generation) {
                    log::error!(
                        "Failed to save checkpoint for generation {}: {e}",
                        request.generation
                    );
                }
            }
            WriteJob::Population {
                generation,
                genomes,
            } => {
                if let Err(e) = store.save_population(&genomes, generation) {
                    log::error!("Failed to save population snapshot {generation}: {e}");
                }
            }
            WriteJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
