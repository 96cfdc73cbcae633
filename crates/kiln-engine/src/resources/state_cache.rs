use std::collections::HashMap;

use crate::command::{BlendMode, ClipRect, ScreenRect};
use crate::driver::{GpuDriver, ProgramId, TextureBinding, Uniform};

/// What a texture unit currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitBinding {
    pub slot: Option<u32>,
    pub layered: bool,
}

/// Last values uploaded to one program's uniforms.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgramUniforms {
    pub screen: Option<[f32; 4]>,
    pub sampler: Option<u32>,
    pub color: Option<[f32; 4]>,
    pub center: Option<[f32; 2]>,
    pub rotation: Option<f32>,
}

/// Render-thread mirror of driver state, used to skip redundant calls.
#[derive(Debug)]
pub struct StateCache {
    last_program: Option<Option<ProgramId>>,
    /// `None` until the first blend call reaches the driver.
    last_blend: Option<BlendMode>,
    clip_enabled: bool,
    units: Vec<UnitBinding>,
    programs: HashMap<ProgramId, ProgramUniforms>,
    clear_color: [f32; 4],
}

impl StateCache {
    pub fn new(texture_units: u32) -> Self {
        Self {
            last_program: None,
            last_blend: None,
            clip_enabled: false,
            units: vec![UnitBinding::default(); texture_units.max(1) as usize],
            programs: HashMap::new(),
            clear_color: [-1.0; 4],
        }
    }

    pub fn unit_count(&self) -> u32 {
        self.units.len() as u32
    }

    pub fn use_program<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, program: Option<ProgramId>) {
        if self.last_program != Some(program) {
            driver.use_program(program);
            self.last_program = Some(program);
        }
    }

    /// Programmable-path blending. `None` keeps the current function; an
    /// unknown or disabled driver state is first restored to alpha blending.
    pub fn apply_blend<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, mode: BlendMode) {
        if matches!(self.last_blend, None | Some(BlendMode::None)) {
            driver.set_blend(BlendMode::Alpha);
            self.last_blend = Some(BlendMode::Alpha);
        }
        if mode != BlendMode::None && self.last_blend != Some(mode) {
            driver.set_blend(mode);
            self.last_blend = Some(mode);
        }
    }

    /// Fixed-path blending: always applied, `None` disables blending.
    pub fn force_blend<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, mode: BlendMode) {
        driver.set_blend(mode);
        self.last_blend = Some(mode);
    }

    /// Enables the scissor for a clip; only disables it if it was enabled.
    pub fn apply_clip<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, clip: Option<ClipRect>) {
        match clip {
            Some(rect) => {
                driver.set_scissor(Some(rect));
                self.clip_enabled = true;
            }
            None if self.clip_enabled => {
                driver.set_scissor(None);
                self.clip_enabled = false;
            }
            None => {}
        }
    }

    /// Records that `unit` now holds `slot`. Returns true if it already did.
    pub fn is_and_update_texture_slot_bound(&mut self, unit: u32, slot: u32, layered: bool) -> bool {
        let Some(entry) = self.units.get_mut(unit as usize) else {
            return false;
        };
        let wanted = UnitBinding {
            slot: Some(slot),
            layered,
        };
        if *entry == wanted {
            return true;
        }
        *entry = wanted;
        false
    }

    pub fn reset_unit(&mut self, unit: u32) {
        if let Some(entry) = self.units.get_mut(unit as usize) {
            *entry = UnitBinding::default();
        }
    }

    /// Binds a texture and returns the unit it lives on.
    ///
    /// With unit optimisation each slot maps to `slot % units` and rebinding
    /// is skipped while the unit still holds it. Without it everything goes
    /// through unit 0 and is always rebound.
    pub fn bind_texture<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        slot: u32,
        binding: Option<TextureBinding>,
        layered: bool,
        multi_unit: bool,
    ) -> u32 {
        if !multi_unit {
            driver.bind_texture(0, binding);
            return 0;
        }
        let unit = slot % self.unit_count();
        if !self.is_and_update_texture_slot_bound(unit, slot, layered) {
            driver.bind_texture(unit, binding);
        }
        unit
    }

    fn uniforms(&mut self, program: ProgramId) -> &mut ProgramUniforms {
        self.programs.entry(program).or_default()
    }

    pub fn set_screen<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        program: ProgramId,
        screen: ScreenRect,
    ) {
        let key = [screen.tl[0], screen.tl[1], screen.br[0], screen.br[1]];
        let cached = self.uniforms(program);
        if cached.screen != Some(key) {
            cached.screen = Some(key);
            driver.set_uniform(program, Uniform::Ortho(screen.ortho()));
        }
    }

    pub fn set_sampler_unit<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        program: ProgramId,
        unit: u32,
    ) {
        let cached = self.uniforms(program);
        if cached.sampler != Some(unit) {
            cached.sampler = Some(unit);
            driver.set_uniform(program, Uniform::TextureUnit(unit));
        }
    }

    pub fn set_color<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        program: ProgramId,
        color: [f32; 4],
    ) {
        let cached = self.uniforms(program);
        if cached.color != Some(color) {
            cached.color = Some(color);
            driver.set_uniform(program, Uniform::Color(color));
        }
    }

    pub fn set_center<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        program: ProgramId,
        center: [f32; 2],
    ) {
        let cached = self.uniforms(program);
        if cached.center != Some(center) {
            cached.center = Some(center);
            driver.set_uniform(program, Uniform::Center(center));
        }
    }

    pub fn set_rotation<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        program: ProgramId,
        rotation: f32,
    ) {
        let cached = self.uniforms(program);
        if cached.rotation != Some(rotation) {
            cached.rotation = Some(rotation);
            driver.set_uniform(program, Uniform::Rotation(rotation));
        }
    }

    /// Sets the clear colour unless the RGB part is unchanged.
    pub fn set_clear_color<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, color: [f32; 4]) {
        if self.clear_color[..3] != color[..3] {
            driver.set_clear_color([color[0], color[1], color[2], 0.0]);
            self.clear_color = color;
        }
    }

    /// Forgets a program, e.g. after it was deleted.
    pub fn forget_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.last_program == Some(Some(program)) {
            self.last_program = None;
        }
    }
}
