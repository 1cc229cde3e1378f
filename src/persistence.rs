//! On-disk format and recovery (`spec.md` §4.6/§6): a fixed-size header,
//! the level-0 record table, the original-vector table, and the
//! variable-length link-list blob. Mirrors `storage::disk::DiskManager`'s
//! write-tmp/fsync/rename convention for the header swap.

use crate::concurrency::EntryPoint;
use crate::config::IndexConfig;
use crate::distance::Metric;
use crate::error::{IndexError, Result};
use crate::graph::Graph;
use crate::storage::{
    atomic_rename, data_level0_path, header_path, header_tmp_path, link_lists_path,
    original_vectors_path, BlobIo, FsBlobIo, LinkEntry, RecordLayout,
};
use std::path::Path;

const MAGIC: [u8; 8] = *b"HNSWIDX\0";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 1 + 4 + 4 * 3 + 4 * 2 + 4 * 2 + 8 + 4;
const NO_ENTRY_POINT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Header {
    version: u32,
    metric: u8,
    dim: u32,
    m: u32,
    m0: u32,
    ef_construction: u32,
    capacity: u32,
    cur_count: u32,
    entry_point: u32,
    max_level: u32,
    m_l: f64,
    /// Default query-time candidate width (`spec.md`'s header table only
    /// names construction params; `ef` is mutable caller state via `setEf`
    /// and must round-trip too, or reload would silently change query
    /// behavior — persisted as a trailing field beyond the literal table).
    ef: u32,
}

impl Header {
    fn encode(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let mut off = 0;
        buf[off..off + 8].copy_from_slice(&MAGIC);
        off += 8;
        buf[off..off + 4].copy_from_slice(&self.version.to_le_bytes());
        off += 4;
        buf[off] = self.metric;
        off += 1;
        buf[off..off + 4].copy_from_slice(&self.dim.to_le_bytes());
        off += 4;
        for field in [self.m, self.m0, self.ef_construction] {
            buf[off..off + 4].copy_from_slice(&field.to_le_bytes());
            off += 4;
        }
        for field in [self.capacity, self.cur_count] {
            buf[off..off + 4].copy_from_slice(&field.to_le_bytes());
            off += 4;
        }
        for field in [self.entry_point, self.max_level] {
            buf[off..off + 4].copy_from_slice(&field.to_le_bytes());
            off += 4;
        }
        buf[off..off + 8].copy_from_slice(&self.m_l.to_le_bytes());
        off += 8;
        buf[off..off + 4].copy_from_slice(&self.ef.to_le_bytes());
        off += 4;
        debug_assert_eq!(off, HEADER_LEN);
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(IndexError::InternalCorruption(
                "header shorter than expected".to_string(),
            ));
        }
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&buf[0..8]);
        if magic != MAGIC {
            return Err(IndexError::FormatMismatch {
                expected: MAGIC,
                actual: magic,
            });
        }
        let mut off = 8;
        let version = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        if version != FORMAT_VERSION {
            return Err(IndexError::VersionMismatch {
                expected: FORMAT_VERSION,
                actual: version,
            });
        }
        let metric = buf[off];
        off += 1;
        let dim = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let mut read_u32 = || {
            let v = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
            v
        };
        let m = read_u32();
        let m0 = read_u32();
        let ef_construction = read_u32();
        let capacity = read_u32();
        let cur_count = read_u32();
        let entry_point = read_u32();
        let max_level = read_u32();
        let m_l = f64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let ef = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        Ok(Self {
            version,
            metric,
            dim,
            m,
            m0,
            ef_construction,
            capacity,
            cur_count,
            entry_point,
            max_level,
            m_l,
            ef,
        })
    }

    fn from_graph(graph: &Graph) -> Self {
        let (entry_point, max_level) = match graph.structural.snapshot() {
            Some(ep) => (ep.slot, ep.max_level as u32),
            None => (NO_ENTRY_POINT, 0),
        };
        Self {
            version: FORMAT_VERSION,
            metric: graph.config.metric.tag(),
            dim: graph.config.dim as u32,
            m: graph.config.m as u32,
            m0: graph.config.m0() as u32,
            ef_construction: graph.config.ef_construction as u32,
            capacity: graph.capacity(),
            cur_count: graph.labels.len() as u32,
            entry_point,
            max_level,
            m_l: graph.config.m_l(),
            ef: graph.ef() as u32,
        }
    }
}

/// Owns the three data files for one persisted index directory. The header
/// is read/written as a whole; `data_level0.bin` and `link_lists.bin` are
/// written incrementally, page- and blob-at-a-time, per `persist_dirty`.
pub struct Persistence {
    dir: std::path::PathBuf,
    data_io: FsBlobIo,
    orig_io: FsBlobIo,
    link_io: FsBlobIo,
}

impl Persistence {
    /// Open (creating if absent) the three data files for `dir`. Does not
    /// read or write a header; callers use `persist_dirty` to write the
    /// first snapshot or `recover` to load an existing one.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            data_io: FsBlobIo::open(&data_level0_path(dir))?,
            orig_io: FsBlobIo::open(&original_vectors_path(dir))?,
            link_io: FsBlobIo::open(&link_lists_path(dir))?,
        })
    }

    /// Write every page the dirty bitmap names, the original-vector table
    /// and link-list blob if either changed, then the header — last, so a
    /// crash mid-flush never leaves a header pointing past unflushed data.
    /// Calling this twice with no intervening mutation writes zero pages.
    pub fn persist_dirty(&self, graph: &Graph) -> Result<()> {
        let stride = graph.records.layout().stride;
        let capacity = graph.capacity();
        let total = stride as u64 * capacity as u64;
        if self.data_io.len()? < total {
            self.data_io.truncate(total)?;
        }

        let bitmap = graph.records.dirty_bitmap();
        let dirty_pages = bitmap.take_dirty();
        if let Err(e) = self.flush_pages(graph, &dirty_pages) {
            bitmap.mark_pages(&dirty_pages);
            return Err(e);
        }

        if graph.records.take_original_dirty() {
            let orig = graph.records.snapshot_original();
            if let Err(e) = self.write_whole(&self.orig_io, &orig) {
                graph.records.mark_original_dirty();
                return Err(e);
            }
        }

        if graph.links.take_dirty() {
            let (entries, blob) = graph.links.snapshot();
            let mut buf = Vec::with_capacity(entries.len() * 12 + blob.len());
            for e in &entries {
                buf.extend_from_slice(&e.offset.to_le_bytes());
                buf.extend_from_slice(&e.len.to_le_bytes());
            }
            buf.extend_from_slice(&blob);
            if let Err(e) = self.write_whole(&self.link_io, &buf) {
                graph.links.mark_dirty();
                return Err(e);
            }
        }

        self.write_header(&Header::from_graph(graph))
    }

    fn flush_pages(&self, graph: &Graph, pages: &[usize]) -> Result<()> {
        let page_size = graph.records.dirty_bitmap().page_size();
        for &page_idx in pages {
            let bytes = graph.records.page_bytes(page_idx);
            self.data_io.write_at((page_idx * page_size) as u64, &bytes)?;
        }
        if !pages.is_empty() {
            self.data_io.fsync()?;
        }
        Ok(())
    }

    fn write_whole(&self, io: &FsBlobIo, bytes: &[u8]) -> Result<()> {
        io.truncate(bytes.len() as u64)?;
        io.write_at(0, bytes)?;
        io.fsync()?;
        Ok(())
    }

    fn write_header(&self, header: &Header) -> Result<()> {
        let tmp = header_tmp_path(&self.dir);
        let final_path = header_path(&self.dir);
        std::fs::write(&tmp, header.encode())?;
        std::fs::File::open(&tmp)?.sync_all()?;
        atomic_rename(&tmp, &final_path)?;
        Ok(())
    }

    /// Extend `data_level0.bin` and `link_lists.bin` on disk to match
    /// `new_capacity`; the in-memory structures have already grown by the
    /// time this is called from `Index::resize_index`.
    pub fn grow_on_disk(&self, graph: &Graph) -> Result<()> {
        let stride = graph.records.layout().stride;
        let total = stride as u64 * graph.capacity() as u64;
        if self.data_io.len()? < total {
            self.data_io.truncate(total)?;
        }
        Ok(())
    }

    /// Load an index directory written by a prior `persist_dirty`: read and
    /// validate the header, rebuild the record/link/original tables and the
    /// label directory by scanning (label `0` marks a slot with no record).
    pub fn recover(dir: &Path) -> Result<(IndexConfig, Graph, Persistence)> {
        let header_bytes = std::fs::read(header_path(dir))?;
        let header = Header::decode(&header_bytes)?;
        let metric = Metric::from_tag(header.metric).ok_or_else(|| {
            IndexError::InternalCorruption(format!("unknown metric tag {}", header.metric))
        })?;

        let mut config = IndexConfig::new(header.dim as usize, metric);
        config.m = header.m as usize;
        config.ef_construction = header.ef_construction as usize;
        config.ef = header.ef as usize;
        config.initial_capacity = header.capacity;

        let graph = Graph::new(config.clone());
        let persistence = Self::open(dir)?;

        let layout = RecordLayout::new(config.dim, config.vector_width(), header.m0 as usize);
        let stride = layout.stride;
        let total = stride * header.capacity as usize;
        let mut record_bytes = vec![0u8; total];
        if persistence.data_io.len()? >= total as u64 {
            persistence.data_io.read_at(0, &mut record_bytes)?;
        }
        graph.records.load_bytes(record_bytes);

        let orig_total = config.dim * config.vector_width() * header.capacity as usize;
        let mut orig_bytes = vec![0u8; orig_total];
        if persistence.orig_io.len()? >= orig_total as u64 {
            persistence.orig_io.read_at(0, &mut orig_bytes)?;
        }
        graph.records.load_original(orig_bytes);

        let link_len = persistence.link_io.len()? as usize;
        let entry_table_len = header.capacity as usize * 12;
        if link_len >= entry_table_len {
            let mut buf = vec![0u8; link_len];
            persistence.link_io.read_at(0, &mut buf)?;
            let mut entries = Vec::with_capacity(header.capacity as usize);
            for slot in 0..header.capacity as usize {
                let base = slot * 12;
                let offset = u64::from_le_bytes(buf[base..base + 8].try_into().unwrap());
                let len = u32::from_le_bytes(buf[base + 8..base + 12].try_into().unwrap());
                entries.push(LinkEntry { offset, len });
            }
            let blob = buf[entry_table_len..].to_vec();
            graph.links.load(entries, blob);
        }

        let mut bound = Vec::new();
        for slot in 0..header.capacity {
            let label = graph.records.get_label(slot)?;
            if label != 0 {
                bound.push((label, slot));
            }
        }
        graph.labels.seed_from_scan(bound, header.capacity);

        let entry_point = if header.entry_point == NO_ENTRY_POINT {
            None
        } else {
            Some(EntryPoint {
                slot: header.entry_point,
                max_level: header.max_level as u8,
            })
        };
        graph.set_entry_point(entry_point);

        Ok((config, graph, persistence))
    }
}
