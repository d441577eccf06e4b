use crate::instructions::instructions::RegisterType;

pub(crate) struct RMTEntry {
    pub(crate) rob_tag: usize,
    pub(crate) valid: bool,
}

/// The Rename Map Table. One entry per register; a valid entry points at
/// the ROB slot of the most recent in-flight producer of that register.
/// As long as such an entry exists, consumers read the producer's tag
/// instead of the architectural register file. Sized over the whole
/// register-field domain, since trace operands are not bounds checked.
pub(crate) struct RMT {
    pub(crate) table: Vec<RMTEntry>,
}

impl RMT {
    pub(crate) fn new() -> RMT {
        let entries = usize::from(RegisterType::MAX) + 1;
        let mut table = Vec::with_capacity(entries);
        for _ in 0..entries {
            table.push(RMTEntry { rob_tag: 0, valid: false });
        }
        RMT { table }
    }

    pub(crate) fn get(&self, arch_reg: RegisterType) -> &RMTEntry {
        &self.table[arch_reg as usize]
    }

    pub(crate) fn update(&mut self, arch_reg: RegisterType, rob_tag: usize) {
        let entry = &mut self.table[arch_reg as usize];
        entry.rob_tag = rob_tag;
        entry.valid = true;
    }

    pub(crate) fn clear(&mut self, arch_reg: RegisterType) {
        self.table[arch_reg as usize].valid = false;
    }
}
