use crate::driver::{BufferId, BufferKind, GpuDriver};

use super::table::SlotTable;

/// One producer-addressed buffer object.
#[derive(Debug, Default)]
pub struct BufferEntry {
    pub handle: Option<BufferId>,
    pub size: usize,
    /// CPU copy of the contents, kept where draws are expanded on the CPU.
    pub shadow: Option<Vec<u8>>,
}

impl BufferEntry {
    pub fn is_live(&self) -> bool {
        self.handle.is_some() || self.shadow.is_some()
    }

    pub fn shadow(&self) -> Option<&[u8]> {
        self.shadow.as_deref()
    }

    /// Frees the GPU handle and the CPU copy. Releasing twice is a no-op.
    pub fn release<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        if let Some(handle) = self.handle.take() {
            driver.delete_buffer(handle);
        }
        self.shadow = None;
        self.size = 0;
    }
}

fn sized_copy(size: usize, data: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; size];
    let n = data.len().min(size);
    bytes[..n].copy_from_slice(&data[..n]);
    bytes
}

/// Buffer objects addressed by producer index.
#[derive(Debug)]
pub struct BufferTable {
    entries: SlotTable<BufferEntry>,
    keep_shadow: bool,
    use_gpu: bool,
}

impl BufferTable {
    /// `keep_shadow` keeps a CPU copy of each buffer; `use_gpu` mirrors
    /// contents into driver buffers. At least one should be set.
    pub fn new(keep_shadow: bool, use_gpu: bool) -> Self {
        Self {
            entries: SlotTable::with_len(0),
            keep_shadow,
            use_gpu,
        }
    }

    pub fn uses_gpu(&self) -> bool {
        self.use_gpu
    }

    pub fn get(&self, index: u32) -> Option<&BufferEntry> {
        self.entries.get(index as usize)
    }

    pub fn handle(&self, index: u32) -> Option<BufferId> {
        self.get(index).and_then(|e| e.handle)
    }

    pub fn create<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        index: u32,
        size: usize,
        data: &[u8],
    ) {
        let entry = self.entries.slot_mut(index as usize);
        if entry.is_live() {
            log::debug!("buffer {index} recreated without delete");
            entry.release(driver);
        }

        if self.use_gpu {
            let init = (!data.is_empty()).then_some(data);
            entry.handle = driver.create_buffer(BufferKind::Vertex, size, init);
            if entry.handle.is_none() {
                log::warn!("driver could not allocate buffer {index} ({size} bytes)");
            }
        }
        if self.keep_shadow {
            entry.shadow = Some(sized_copy(size, data));
        }
        entry.size = size;
    }

    /// Replaces the storage of a buffer, keeping its handle.
    pub fn recreate<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        index: u32,
        size: usize,
        data: &[u8],
    ) {
        let live = (index as usize) < self.entries.len()
            && self
                .entries
                .get(index as usize)
                .is_some_and(BufferEntry::is_live);
        if !live {
            self.create(driver, index, size, data);
            return;
        }
        let Some(entry) = self.entries.get_mut(index as usize) else {
            return;
        };

        if let Some(handle) = entry.handle {
            let init = (!data.is_empty()).then_some(data);
            driver.reallocate_buffer(handle, size, init);
        }
        if self.keep_shadow {
            entry.shadow = Some(sized_copy(size, data));
        }
        entry.size = size;
    }

    /// Writes `data` at `offset`; writes past the end are clipped.
    pub fn update<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        index: u32,
        offset: usize,
        data: &[u8],
    ) {
        let Some(entry) = self.entries.get_mut(index as usize) else {
            return;
        };
        let Some(end) = offset.checked_add(data.len()) else {
            log::warn!("buffer {index} update at offset {offset} overflows");
            return;
        };
        if end > entry.size {
            log::warn!(
                "buffer {index} update [{offset}, +{}) exceeds size {}",
                data.len(),
                entry.size
            );
        }
        if let Some(shadow) = entry.shadow.as_mut() {
            let end = end.min(shadow.len());
            if offset < end {
                shadow[offset..end].copy_from_slice(&data[..end - offset]);
            }
        }
        if let Some(handle) = entry.handle {
            driver.write_buffer(handle, offset, data);
        }
    }

    pub fn copy<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        src: u32,
        dst: u32,
        src_offset: usize,
        dst_offset: usize,
        size: usize,
    ) {
        if !self.keep_shadow {
            match (self.handle(src), self.handle(dst)) {
                (Some(s), Some(d)) => driver.copy_buffer(s, d, src_offset, dst_offset, size),
                _ => log::warn!("copy between buffers {src} and {dst}: missing handle"),
            }
            return;
        }

        let Some(bytes) = self
            .get(src)
            .and_then(BufferEntry::shadow)
            .and_then(|s| s.get(src_offset..src_offset.saturating_add(size)))
            .map(<[u8]>::to_vec)
        else {
            log::warn!("copy from buffer {src}: range [{src_offset}, +{size}) out of bounds");
            return;
        };
        self.update(driver, dst, dst_offset, &bytes);
    }

    pub fn delete<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, index: u32) {
        if let Some(entry) = self.entries.get_mut(index as usize) {
            entry.release(driver);
        }
    }

    pub fn release_all<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        for entry in self.entries.iter_mut() {
            entry.release(driver);
        }
    }

    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_live()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RecordingDriver;

    // ── gpu-backed ──

    #[test]
    fn create_zero_fills_tail() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = BufferTable::new(false, true);
        t.create(&mut d, 2, 6, &[1, 2]);

        let h = t.handle(2).expect("handle");
        assert_eq!(d.buffer_data(h), Some(&[1, 2, 0, 0, 0, 0][..]));
        assert!(t.get(2).and_then(BufferEntry::shadow).is_none());
    }

    #[test]
    fn recreate_keeps_handle() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = BufferTable::new(false, true);
        t.create(&mut d, 0, 4, &[1, 1, 1, 1]);
        let h = t.handle(0);
        t.recreate(&mut d, 0, 2, &[7, 7]);

        assert_eq!(t.handle(0), h);
        assert_eq!(d.buffer_data(h.expect("handle")), Some(&[7, 7][..]));
    }

    #[test]
    fn copy_uses_driver() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = BufferTable::new(false, true);
        t.create(&mut d, 0, 4, &[1, 2, 3, 4]);
        t.create(&mut d, 1, 4, &[]);
        t.copy(&mut d, 0, 1, 2, 0, 2);

        let h = t.handle(1).expect("handle");
        assert_eq!(d.buffer_data(h), Some(&[3, 4, 0, 0][..]));
    }

    #[test]
    fn delete_twice_releases_once() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = BufferTable::new(false, true);
        t.create(&mut d, 0, 4, &[]);
        let h = t.handle(0).expect("handle");
        t.delete(&mut d, 0);
        t.delete(&mut d, 0);
        assert_eq!(d.releases_of(h), 1);
        assert_eq!(t.live_count(), 0);
    }

    // ── shadowed ──

    #[test]
    fn shadow_only_has_no_handle() {
        let mut d = RecordingDriver::with_version("2.1.0");
        let mut t = BufferTable::new(true, false);
        t.create(&mut d, 0, 4, &[9]);
        assert!(t.handle(0).is_none());
        assert_eq!(t.get(0).and_then(BufferEntry::shadow), Some(&[9, 0, 0, 0][..]));
        assert_eq!(d.live_buffers(), 0);
    }

    #[test]
    fn shadow_copy_reuploads_destination_range() {
        let mut d = RecordingDriver::with_version("2.1.0");
        let mut t = BufferTable::new(true, true);
        t.create(&mut d, 0, 4, &[1, 2, 3, 4]);
        t.create(&mut d, 1, 4, &[]);
        t.copy(&mut d, 0, 1, 0, 2, 2);

        assert_eq!(t.get(1).and_then(BufferEntry::shadow), Some(&[0, 0, 1, 2][..]));
        let h = t.handle(1).expect("handle");
        assert_eq!(d.buffer_data(h), Some(&[0, 0, 1, 2][..]));
    }

    #[test]
    fn update_is_clipped_to_size() {
        let mut d = RecordingDriver::with_version("2.1.0");
        let mut t = BufferTable::new(true, false);
        t.create(&mut d, 0, 3, &[]);
        t.update(&mut d, 0, 2, &[5, 6, 7]);
        assert_eq!(t.get(0).and_then(BufferEntry::shadow), Some(&[0, 0, 5][..]));
    }

    #[test]
    fn overflowing_offset_is_rejected() {
        let mut d = RecordingDriver::with_version("2.1.0");
        let mut t = BufferTable::new(true, false);
        t.create(&mut d, 0, 3, &[1, 2, 3]);
        t.update(&mut d, 0, usize::MAX, &[9, 9]);
        assert_eq!(t.get(0).and_then(BufferEntry::shadow), Some(&[1, 2, 3][..]));
    }
}
