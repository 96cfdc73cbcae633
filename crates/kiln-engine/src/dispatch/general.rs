use crate::command::{Command, Opcode};
use crate::driver::RenderDevice;

use super::{DispatchState, Fragment};

/// Device-independent records.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneralFragment;

impl<D: RenderDevice> Fragment<D> for GeneralFragment {
    fn claims(&self, opcode: Opcode) -> bool {
        matches!(opcode, Opcode::Nop | Opcode::Signal)
    }

    fn execute(&mut self, _device: &mut D, _state: &mut DispatchState, command: Command, _arena: &[u8]) {
        if let Command::Signal(signal) = command {
            signal.signal();
        }
    }
}
