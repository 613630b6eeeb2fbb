//! RGSS archive reader.

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use memmap2::Mmap;
use tracing::info;

use crate::entry::EntryRecord;
use crate::format::Version;
use crate::index::{ArchiveIndex, RejectedEntry};
use crate::source::{ByteSource, SharedSource};
use crate::stream::ContentStream;
use crate::tree::{Node, NodeId, NodeKind, VirtualTree};
use crate::{Error, Result};

/// An opened RGSSAD, RGSS2A or RGSS3A archive.
///
/// The entry table is parsed once at open time. Contents are decrypted on
/// demand by [`ContentStream`]s, any number of which may be open at once.
pub struct Archive<R = Cursor<Mmap>> {
    /// Archive file name
    name: String,
    /// Byte source shared by every stream
    source: SharedSource<R>,
    index: ArchiveIndex,
    tree: VirtualTree,
}

impl Archive {
    /// Open an archive file through a memory map.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Self::from_reader(Cursor::new(mmap), name)
    }
}

impl<R: Read + Seek> Archive<R> {
    /// Open an archive from any seekable reader.
    ///
    /// Fails if the header is invalid, the entry table is truncated, or two
    /// entries claim the same path. Entries with bad metadata are skipped and
    /// reported by [`rejected`](Self::rejected).
    pub fn from_reader(reader: R, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut source = ByteSource::new(reader)?;
        let index = ArchiveIndex::parse(&mut source)?;
        let tree = VirtualTree::build(index.entries())?;

        info!(
            archive = %name,
            version = ?index.version(),
            entries = index.entries().len(),
            rejected = index.rejected().len(),
            bytes = source.len(),
            "opened archive"
        );

        Ok(Self {
            name,
            source: SharedSource::new(source),
            index,
            tree,
        })
    }

    /// Get the archive name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the format version.
    #[inline]
    pub fn version(&self) -> Version {
        self.index.version()
    }

    /// Get the archive file length in bytes.
    #[inline]
    pub fn byte_len(&self) -> u64 {
        self.source.len()
    }

    /// Whether the archive holds no accepted entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.entries().is_empty()
    }

    /// Get the parsed header and entry table.
    #[inline]
    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    /// Get the directory tree.
    #[inline]
    pub fn tree(&self) -> &VirtualTree {
        &self.tree
    }

    /// Get the accepted entries in table order.
    #[inline]
    pub fn entries(&self) -> &[EntryRecord] {
        self.index.entries()
    }

    /// Get the entries skipped while indexing.
    #[inline]
    pub fn rejected(&self) -> &[RejectedEntry] {
        self.index.rejected()
    }

    /// Get the number of accepted entries.
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.index.entries().len()
    }

    /// Get entry by index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&EntryRecord> {
        self.index.entries().get(index)
    }

    /// Find a file entry by path. Both separators are accepted.
    pub fn find(&self, path: &str) -> Option<&EntryRecord> {
        match self.tree.node(self.tree.lookup(path)?)? {
            Node::File { entry, .. } => self.get(*entry),
            Node::Directory { .. } => None,
        }
    }

    /// Resolve a path to a directory listing or an open file.
    pub fn resolve(&self, path: &str) -> Result<Resolved<'_, R>> {
        let id = self
            .tree
            .lookup(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;

        match self.tree.node(id) {
            Some(Node::Directory { .. }) => Ok(Resolved::Directory(DirectoryListing {
                archive: self,
                node: id,
            })),
            Some(Node::File { entry, .. }) => {
                let entry = self
                    .get(*entry)
                    .ok_or_else(|| Error::NotFound(path.to_string()))?;
                Ok(Resolved::File(FileHandle {
                    stream: self.open_entry(entry)?,
                }))
            }
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    /// Open the file at `path`.
    pub fn open_file(&self, path: &str) -> Result<FileHandle<R>> {
        match self.resolve(path)? {
            Resolved::File(handle) => Ok(handle),
            Resolved::Directory(_) => Err(Error::IsADirectory(path.to_string())),
        }
    }

    /// Open a content stream for an entry.
    pub fn open_entry(&self, entry: &EntryRecord) -> Result<ContentStream<R>> {
        ContentStream::open(
            self.source.clone(),
            entry.clone(),
            self.index.keying().as_ref(),
        )
    }

    /// Read and decrypt a whole entry.
    pub fn read_entry(&self, entry: &EntryRecord) -> Result<Vec<u8>> {
        let len = usize::try_from(entry.size()).map_err(|_| Error::Allocation(usize::MAX))?;
        self.open_entry(entry)?.read_at(0, len)
    }

    /// Read entry by index.
    pub fn read_index(&self, index: usize) -> Result<Vec<u8>> {
        let entry = self
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("entry #{index}")))?;
        self.read_entry(entry)
    }

    /// Sum of all accepted entry sizes.
    pub fn total_size(&self) -> u64 {
        self.index.entries().iter().map(EntryRecord::size).sum()
    }
}

#[cfg(feature = "parallel")]
impl<R: Read + Seek + Send> Archive<R> {
    /// Parallel extraction of multiple entries.
    pub fn read_parallel(&self, entries: &[&EntryRecord]) -> Vec<Result<Vec<u8>>> {
        use rayon::prelude::*;

        entries
            .par_iter()
            .map(|entry| self.read_entry(entry))
            .collect()
    }

    /// Parallel extraction with callback for streaming.
    pub fn extract_parallel<F>(&self, indices: &[usize], mut callback: F) -> Result<()>
    where
        F: FnMut(usize, &EntryRecord, Result<Vec<u8>>) + Send,
    {
        use parking_lot::Mutex;
        use rayon::prelude::*;

        let callback = Mutex::new(&mut callback);

        indices.par_iter().try_for_each(|&idx| {
            let entry = self
                .get(idx)
                .ok_or_else(|| Error::NotFound(format!("entry #{idx}")))?;
            let result = self.read_entry(entry);

            (callback.lock())(idx, entry, result);
            Ok(())
        })
    }
}

impl<R> std::fmt::Debug for Archive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("name", &self.name)
            .field("version", &self.index.version())
            .field("entries", &self.index.entries().len())
            .finish()
    }
}

/// What a path names inside an archive.
#[derive(Debug)]
pub enum Resolved<'a, R> {
    Directory(DirectoryListing<'a, R>),
    File(FileHandle<R>),
}

/// A directory of an archive's virtual tree.
pub struct DirectoryListing<'a, R> {
    archive: &'a Archive<R>,
    node: NodeId,
}

impl<'a, R: Read + Seek> DirectoryListing<'a, R> {
    /// Directory name; empty for the root.
    pub fn name(&self) -> &'a str {
        self.archive
            .tree
            .node(self.node)
            .map(Node::name)
            .unwrap_or_default()
    }

    /// Child names with their kinds, sorted by name.
    pub fn children(&self) -> Vec<(String, NodeKind)> {
        let tree = &self.archive.tree;
        tree.children(self.node)
            .filter_map(|(name, id)| Some((name.to_string(), tree.node(id)?.kind())))
            .collect()
    }

    /// Entries of the files directly inside this directory.
    pub fn files(&self) -> impl Iterator<Item = &'a EntryRecord> + 'a {
        let archive = self.archive;
        archive
            .tree
            .children(self.node)
            .filter_map(move |(_, id)| match archive.tree.node(id)? {
                Node::File { entry, .. } => archive.get(*entry),
                Node::Directory { .. } => None,
            })
    }
}

impl<R> std::fmt::Debug for DirectoryListing<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryListing")
            .field("archive", &self.archive.name)
            .field("node", &self.node)
            .finish()
    }
}

/// An open file of an archive.
#[derive(Debug)]
pub struct FileHandle<R> {
    stream: ContentStream<R>,
}

impl<R: Read + Seek> FileHandle<R> {
    /// File length in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.stream.len()
    }

    #[inline]
    pub fn entry(&self) -> &EntryRecord {
        self.stream.entry()
    }

    /// Read up to `len` bytes at `offset`; clipped to the file.
    pub fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.stream.read_at(offset, len)
    }

    pub fn into_stream(self) -> ContentStream<R> {
        self.stream
    }
}
