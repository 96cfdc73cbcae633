use crate::command::ContainerInfo;
use crate::driver::{BufferId, GpuDriver, LayoutId, VertexBinding};

use super::buffer::BufferTable;
use super::table::SlotTable;

/// A vertex layout over one or more buffer objects.
#[derive(Debug, Default)]
pub struct ContainerEntry {
    pub layout: Option<LayoutId>,
    pub info: ContainerInfo,
    /// Index buffer last attached to `layout`.
    pub last_index_buffer: Option<BufferId>,
    pub live: bool,
}

impl ContainerEntry {
    /// Buffer indices referenced by the attributes, each listed once.
    ///
    /// Later attributes naming an already-listed buffer have their reference
    /// cleared so the buffer is only ever released through one of them.
    pub fn take_buffer_refs(&mut self) -> Vec<u32> {
        let mut refs = Vec::new();
        for attr in &mut self.info.attributes {
            let Some(index) = attr.buffer_index else {
                continue;
            };
            if refs.contains(&index) {
                attr.buffer_index = None;
            } else {
                refs.push(index);
            }
        }
        refs
    }

    /// Attaches `index_buffer` to the layout unless it already is.
    pub fn bind_index_buffer<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        index_buffer: BufferId,
    ) {
        let Some(layout) = self.layout else {
            return;
        };
        if self.last_index_buffer != Some(index_buffer) {
            driver.set_index_buffer(layout, Some(index_buffer));
            self.last_index_buffer = Some(index_buffer);
        }
    }
}

fn bindings(info: &ContainerInfo, buffers: &BufferTable) -> Vec<VertexBinding> {
    info.attributes
        .iter()
        .enumerate()
        .filter_map(|(location, attr)| {
            let buffer = buffers.handle(attr.buffer_index?)?;
            Some(VertexBinding {
                location: location as u32,
                buffer,
                kind: attr.kind,
                components: attr.components,
                normalized: attr.normalized,
                stride: info.stride,
                offset: attr.offset,
            })
        })
        .collect()
}

/// Containers addressed by producer index.
#[derive(Debug)]
pub struct ContainerTable {
    entries: SlotTable<ContainerEntry>,
    /// Whether containers get a driver-side vertex layout.
    use_layouts: bool,
}

impl ContainerTable {
    pub fn new(use_layouts: bool) -> Self {
        Self {
            entries: SlotTable::with_len(0),
            use_layouts,
        }
    }

    pub fn get(&self, index: u32) -> Option<&ContainerEntry> {
        self.entries.get(index as usize).filter(|e| e.live)
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut ContainerEntry> {
        self.entries.get_mut(index as usize).filter(|e| e.live)
    }

    pub fn create<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        index: u32,
        info: ContainerInfo,
        buffers: &BufferTable,
    ) {
        let entry = self.entries.slot_mut(index as usize);
        if let Some(layout) = entry.layout.take() {
            driver.delete_vertex_layout(layout);
        }
        entry.last_index_buffer = None;

        if self.use_layouts {
            entry.layout = driver.create_vertex_layout();
            match entry.layout {
                Some(layout) => driver.set_vertex_attributes(layout, &bindings(&info, buffers)),
                None => log::warn!("driver could not create layout for container {index}"),
            }
        }
        entry.info = info;
        entry.live = true;
    }

    /// Replaces the attribute set; the layout and index-buffer binding stay.
    pub fn update<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        index: u32,
        info: ContainerInfo,
        buffers: &BufferTable,
    ) {
        let Some(entry) = self.get_mut(index) else {
            log::warn!("update of unknown container {index}");
            return;
        };
        if let Some(layout) = entry.layout {
            driver.set_vertex_attributes(layout, &bindings(&info, buffers));
        }
        entry.info = info;
    }

    /// Removes a container, optionally releasing each referenced buffer once.
    pub fn delete<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        index: u32,
        destroy_buffers: bool,
        buffers: &mut BufferTable,
    ) {
        let Some(entry) = self.get_mut(index) else {
            return;
        };
        if destroy_buffers {
            for buffer in entry.take_buffer_refs() {
                buffers.delete(driver, buffer);
            }
        }
        if let Some(layout) = entry.layout.take() {
            driver.delete_vertex_layout(layout);
        }
        *entry = ContainerEntry::default();
    }

    /// Forgets every index-buffer binding, e.g. after the quad index buffer
    /// was replaced.
    pub fn reset_index_caches(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.last_index_buffer = None;
        }
    }

    pub fn release_all<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        for entry in self.entries.iter_mut() {
            if let Some(layout) = entry.layout.take() {
                driver.delete_vertex_layout(layout);
            }
            *entry = ContainerEntry::default();
        }
    }
}
