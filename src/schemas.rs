//! 四个工具的字段注册表：cpustat、vmstat、netstat、linescount

use crate::schema::{Derived, FieldDef, LineDef, Layout, RelativeDef, Schema};
use crate::sysconf::SystemConf;

/// `/proc/stat` 中 cpu 行的十个计数器，单位为 USER_HZ
const CPU_COUNTERS: [FieldDef; 10] = [
    FieldDef::acc("cpu", "user"),
    FieldDef::acc("cpu", "nice"),
    FieldDef::acc("cpu", "system"),
    FieldDef::acc("cpu", "idle"),
    FieldDef::acc("cpu", "iowait"),
    FieldDef::acc("cpu", "irq"),
    FieldDef::acc("cpu", "softirq"),
    FieldDef::acc("cpu", "steal"),
    FieldDef::acc("cpu", "guest"),
    FieldDef::acc("cpu", "guest_nice"),
];

/// cpustat 槽位
pub mod cpu {
    pub const PROCS_FORKS: usize = 0;
    pub const PROCS_RUNNING: usize = 1;
    pub const PROCS_BLOCKED: usize = 2;
    pub const INTR_TOTAL: usize = 3;
    pub const CTXT_TOTAL: usize = 4;
    pub const MAX: usize = 5;
    pub const TOTAL: usize = 6;
    pub const USER: usize = 7;
    pub const NICE: usize = 8;
    pub const SYSTEM: usize = 9;
    pub const IDLE: usize = 10;
    pub const IOWAIT: usize = 11;
    pub const IRQ: usize = 12;
    pub const SOFTIRQ: usize = 13;
    pub const STEAL: usize = 14;
    pub const GUEST: usize = 15;
    pub const GUEST_NICE: usize = 16;
    pub const FIELD_COUNT: usize = 17;

    pub const COUNTERS: [usize; 10] = [
        USER, NICE, SYSTEM, IDLE, IOWAIT, IRQ, SOFTIRQ, STEAL, GUEST, GUEST_NICE,
    ];

    /// guest 与 guest_nice 已经计入 user 与 nice，不参与总量
    pub const COUNTERS_FOR_TOTAL: [usize; 8] =
        [USER, NICE, SYSTEM, IDLE, IOWAIT, IRQ, SOFTIRQ, STEAL];
}

const CPU_FIELDS: [FieldDef; cpu::FIELD_COUNT] = [
    FieldDef::acc("procs", "forks"),
    FieldDef::inst("procs", "running"),
    FieldDef::inst("procs", "blocked"),
    FieldDef::acc("intr", "total"),
    FieldDef::acc("ctxt", "total"),
    FieldDef::inst("cpu", "max"),
    FieldDef::acc("cpu", "total"),
    CPU_COUNTERS[0],
    CPU_COUNTERS[1],
    CPU_COUNTERS[2],
    CPU_COUNTERS[3],
    CPU_COUNTERS[4],
    CPU_COUNTERS[5],
    CPU_COUNTERS[6],
    CPU_COUNTERS[7],
    CPU_COUNTERS[8],
    CPU_COUNTERS[9],
];

const CPU_LINES: [LineDef; 6] = [
    LineDef {
        prefix: "cpu",
        slots: &cpu::COUNTERS,
    },
    LineDef {
        prefix: "intr",
        slots: &[cpu::INTR_TOTAL],
    },
    LineDef {
        prefix: "ctxt",
        slots: &[cpu::CTXT_TOTAL],
    },
    LineDef {
        prefix: "processes",
        slots: &[cpu::PROCS_FORKS],
    },
    LineDef {
        prefix: "procs_running",
        slots: &[cpu::PROCS_RUNNING],
    },
    LineDef {
        prefix: "procs_blocked",
        slots: &[cpu::PROCS_BLOCKED],
    },
];

fn cpu_max(_fields: &[u64], conf: &SystemConf) -> u64 {
    conf.cpu_capacity()
}

fn cpu_total(fields: &[u64], _conf: &SystemConf) -> u64 {
    cpu::COUNTERS_FOR_TOTAL
        .iter()
        .fold(0u64, |total, &slot| total.wrapping_add(fields[slot]))
}

const CPU_SCHEMA: Schema = Schema {
    name: "cpustat",
    path: "proc/stat",
    fields: &CPU_FIELDS,
    layout: Layout::Prefixed(&CPU_LINES),
    derived: &[
        Derived {
            slot: cpu::MAX,
            calc: cpu_max,
        },
        Derived {
            slot: cpu::TOTAL,
            calc: cpu_total,
        },
    ],
    relative: Some(RelativeDef {
        total: cpu::TOTAL,
        parts: &cpu::COUNTERS,
    }),
};

const _: () = CPU_SCHEMA.validate();

/// CPU 与进程统计（`/proc/stat`）
pub static CPU_STAT: Schema = CPU_SCHEMA;

/// vmstat 槽位
pub mod vm {
    pub const PROCS_FORKS: usize = 0;
    pub const PROCS_RUNNING: usize = 1;
    pub const PROCS_BLOCKED: usize = 2;
    pub const INTR_TOTAL: usize = 3;
    pub const CTXT_TOTAL: usize = 4;
    pub const CPU_TOTAL: usize = 5;
    pub const CPU_FIRST: usize = 6;
    pub const FIELD_COUNT: usize = 16;

    pub const COUNTERS: [usize; 10] = [
        CPU_FIRST,
        CPU_FIRST + 1,
        CPU_FIRST + 2,
        CPU_FIRST + 3,
        CPU_FIRST + 4,
        CPU_FIRST + 5,
        CPU_FIRST + 6,
        CPU_FIRST + 7,
        CPU_FIRST + 8,
        CPU_FIRST + 9,
    ];
}

const VM_FIELDS: [FieldDef; vm::FIELD_COUNT] = [
    FieldDef::acc("procs", "forks"),
    FieldDef::inst("procs", "running"),
    FieldDef::inst("procs", "blocked"),
    FieldDef::acc("intr", "total"),
    FieldDef::acc("ctxt", "total"),
    FieldDef::acc("cpu", "total"),
    CPU_COUNTERS[0],
    CPU_COUNTERS[1],
    CPU_COUNTERS[2],
    CPU_COUNTERS[3],
    CPU_COUNTERS[4],
    CPU_COUNTERS[5],
    CPU_COUNTERS[6],
    CPU_COUNTERS[7],
    CPU_COUNTERS[8],
    CPU_COUNTERS[9],
];

const VM_LINES: [LineDef; 6] = [
    LineDef {
        prefix: "cpu",
        slots: &vm::COUNTERS,
    },
    LineDef {
        prefix: "intr",
        slots: &[vm::INTR_TOTAL],
    },
    LineDef {
        prefix: "ctxt",
        slots: &[vm::CTXT_TOTAL],
    },
    LineDef {
        prefix: "processes",
        slots: &[vm::PROCS_FORKS],
    },
    LineDef {
        prefix: "procs_running",
        slots: &[vm::PROCS_RUNNING],
    },
    LineDef {
        prefix: "procs_blocked",
        slots: &[vm::PROCS_BLOCKED],
    },
];

/// vmstat 的总量包含全部十个计数器
fn vm_cpu_total(fields: &[u64], _conf: &SystemConf) -> u64 {
    vm::COUNTERS
        .iter()
        .fold(0u64, |total, &slot| total.wrapping_add(fields[slot]))
}

const VM_SCHEMA: Schema = Schema {
    name: "vmstat",
    path: "proc/stat",
    fields: &VM_FIELDS,
    layout: Layout::Prefixed(&VM_LINES),
    derived: &[Derived {
        slot: vm::CPU_TOTAL,
        calc: vm_cpu_total,
    }],
    relative: Some(RelativeDef {
        total: vm::CPU_TOTAL,
        parts: &vm::COUNTERS,
    }),
};

const _: () = VM_SCHEMA.validate();

/// 进程与虚拟内存视角的统计（`/proc/stat`）
pub static VM_STAT: Schema = VM_SCHEMA;

/// netstat 槽位
pub mod net {
    pub const RX_BYTES: usize = 0;
    pub const RX_PACKETS: usize = 1;
    pub const TX_BYTES: usize = 8;
    pub const TX_PACKETS: usize = 9;
    pub const FIELD_COUNT: usize = 16;
}

const NET_FIELDS: [FieldDef; net::FIELD_COUNT] = [
    FieldDef::acc("rx", "bytes"),
    FieldDef::acc("rx", "packets"),
    FieldDef::acc("rx", "errs"),
    FieldDef::acc("rx", "drops"),
    FieldDef::acc("rx", "fifo"),
    FieldDef::acc("rx", "frame"),
    FieldDef::acc("rx", "compressed"),
    FieldDef::acc("rx", "multicast"),
    FieldDef::acc("tx", "bytes"),
    FieldDef::acc("tx", "packets"),
    FieldDef::acc("tx", "errs"),
    FieldDef::acc("tx", "drops"),
    FieldDef::acc("tx", "fifo"),
    FieldDef::acc("tx", "colls"),
    FieldDef::acc("tx", "carrier"),
    FieldDef::acc("tx", "compressed"),
];

const NET_SCHEMA: Schema = Schema {
    name: "netstat",
    path: "proc/net/dev",
    fields: &NET_FIELDS,
    layout: Layout::Keyed {
        separator: ':',
        label: "interface",
    },
    derived: &[],
    relative: None,
};

const _: () = NET_SCHEMA.validate();

/// 网络接口统计（`/proc/net/dev`），每个接口一组字段
pub static NET_DEV: Schema = NET_SCHEMA;

/// linescount 槽位
pub mod lines {
    pub const COUNT: usize = 0;
}

const LINES_SCHEMA: Schema = Schema {
    name: "linescount",
    path: "-",
    fields: &[FieldDef::acc("lines", "count")],
    layout: Layout::Stream,
    derived: &[],
    relative: None,
};

const _: () = LINES_SCHEMA.validate();

/// 文本流中匹配行的计数
pub static LINES_COUNT: Schema = LINES_SCHEMA;
