//! Synthetic x86_64 kernel snapshot shared by the integration tests
//!
//! All objects live in one region of `SIZE` bytes mapped at `BASE`. The
//! catalog models a handful of kernel types (`list_head`, `task_struct`,
//! radix tree nodes, inodes, loaded modules) with realistic offsets, and the memory is
//! filled by hand so every test knows exactly which bytes it reads.

#![allow(dead_code)]

use std::collections::HashMap;

use kinsight_core::prelude::*;
use kinsight_utils::{LogFormat, LogLevel};

pub const BASE: u64 = 0xffff_8800_0000_0000;
pub const SIZE: usize = 0x10000;

/// Address of an object inside the mapped region
pub const fn at(offset: u64) -> u64
{
    BASE + offset
}

// Tasks
pub const INIT_TASK: u64 = at(0x100);
pub const TASK_SIZE: u64 = 80;
pub const TASKS_OFFSET: u64 = 8;
pub const PID_LINK_OFFSET: u64 = 24;
pub const NULLS_LINK_OFFSET: u64 = 40;
pub const COMM_OFFSET: u64 = 56;
pub const PARENT_OFFSET: u64 = 72;

/// Address of task `i` (1-based) on the task list
pub const fn task(i: u64) -> u64
{
    at(0x1000 + i * 0x100)
}

pub const PID_HASH: u64 = at(0x3000);
pub const NULLS_HEAD: u64 = at(0x3010);
pub const NULLS_END: u64 = 7;
pub const BROKEN_LIST: u64 = at(0x3100);
pub const NULL_LIST: u64 = at(0x3120);
pub const CYCLE_A: u64 = at(0x5000);
pub const CYCLE_B: u64 = at(0x5100);
pub const DANGLING: u64 = at(0x5200);

// Radix trees
pub const PAGE_TREE: u64 = at(0x4000);
pub const BAD_TREE: u64 = at(0x4010);
pub const TALL_TREE: u64 = at(0x4020);
pub const EMPTY_TREE: u64 = at(0x4030);
pub const LOOP_TREE: u64 = at(0x4040);
pub const NODE_TOP: u64 = at(0x4100);
pub const NODE_LEFT: u64 = at(0x4200);
pub const NODE_RIGHT: u64 = at(0x4300);
pub const NODE_BAD_TOP: u64 = at(0x4400);
pub const NODE_BAD_CHILD: u64 = at(0x4500);
pub const NODE_LOOP: u64 = at(0x4600);

pub const fn page(i: u64) -> u64
{
    at(0x4800 + i * 0x10)
}

// Inodes and their operation tables
pub const SHMEM_OPS: u64 = at(0x6000);
pub const EXT4_SOPS: u64 = at(0x6040);
pub const SB_SHMEM: u64 = at(0x6100);
pub const SB_EXT4: u64 = at(0x6110);
pub const SB_PROC: u64 = at(0x6120);
pub const SHMEM_INFO: u64 = at(0x6200);
pub const SHMEM_VFS_INODE: u64 = at(0x6210);
pub const EXT4_INODE: u64 = at(0x6300);
pub const PROC_INODE_INFO: u64 = at(0x6400);
pub const PROC_VFS_INODE: u64 = at(0x6408);
pub const ORPHAN_INODE: u64 = at(0x6500);
pub const PROC_RODATA: u64 = at(0x7000);
pub const PROC_SOPS_OFFSET: u64 = 0x20;

// Per-CPU data
pub const PER_CPU_OFFSET: u64 = at(0x8000);
pub const NR_CPU_IDS: u64 = at(0x8040);
pub const RUNQUEUES_TEMPLATE: u64 = 0x100;
pub const CPU0_AREA: u64 = at(0x9000);
pub const CPU1_AREA: u64 = at(0x9100);

// Loaded modules; only `proc` has a section table
pub const MODULES: u64 = at(0xb000);
pub const MODULE_EXT4: u64 = at(0xb100);
pub const MODULE_PROC: u64 = at(0xb200);
pub const PROC_SECT_ATTRS: u64 = at(0xb300);
pub const SECTION_NAMES: u64 = at(0xb400);
pub const PROC_TEXT: u64 = 0xffff_ffff_a000_0000;

// Members with several candidate types
pub const HOLDER_SMALL: u64 = at(0xa000);
pub const HOLDER_POINTER: u64 = at(0xa010);

/// Little-endian byte writer for the mapped region
pub struct Memory
{
    bytes: Vec<u8>,
}

impl Memory
{
    pub fn new() -> Self
    {
        Self { bytes: vec![0; SIZE] }
    }

    pub fn put(&mut self, address: u64, data: &[u8])
    {
        let offset = usize::try_from(address - BASE).unwrap();
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn put_u32(&mut self, address: u64, value: u32)
    {
        self.put(address, &value.to_le_bytes());
    }

    pub fn put_i32(&mut self, address: u64, value: i32)
    {
        self.put(address, &value.to_le_bytes());
    }

    pub fn put_u64(&mut self, address: u64, value: u64)
    {
        self.put(address, &value.to_le_bytes());
    }

    pub fn into_image(self, name: &str) -> SnapshotImage
    {
        SnapshotImage::new(name).with_region(Address::new(BASE), self.bytes)
    }
}

/// Catalog of the synthetic kernel
pub fn catalog() -> TypeCatalog
{
    let mut b = CatalogBuilder::new(Architecture::X86_64);
    let int = b.base("int", 4, BaseEncoding::Signed);
    let uint = b.base("unsigned int", 4, BaseEncoding::Unsigned);
    let ulong = b.base("unsigned long", 8, BaseEncoding::Unsigned);
    let chr = b.base("char", 1, BaseEncoding::Signed);
    let char_ptr = b.pointer(Some(chr));
    let void_ptr = b.pointer(None);

    let list_head = b.declare_struct("list_head", 16);
    let list_ptr = b.pointer(Some(list_head));
    b.define_members(list_head, vec![Member::new("next", 0, list_ptr), Member::new("prev", 8, list_ptr)])
        .unwrap();

    let hlist_node = b.declare_struct("hlist_node", 16);
    let hlist_ptr = b.pointer(Some(hlist_node));
    let hlist_pptr = b.pointer(Some(hlist_ptr));
    b.define_members(hlist_node, vec![Member::new("next", 0, hlist_ptr), Member::new("pprev", 8, hlist_pptr)])
        .unwrap();
    let hlist_head = b.structure("hlist_head", 8, vec![Member::new("first", 0, hlist_ptr)]);

    let nulls_node = b.declare_struct("hlist_nulls_node", 16);
    let nulls_ptr = b.pointer(Some(nulls_node));
    let nulls_pptr = b.pointer(Some(nulls_ptr));
    b.define_members(nulls_node, vec![Member::new("next", 0, nulls_ptr), Member::new("pprev", 8, nulls_pptr)])
        .unwrap();
    let nulls_head = b.structure("hlist_nulls_head", 8, vec![Member::new("first", 0, nulls_ptr)]);

    let task = b.declare_struct("task_struct", TASK_SIZE);
    let task_ptr = b.pointer(Some(task));
    let comm = b.array(chr, Some(16));
    b.define_members(
        task,
        vec![
            Member::new("pid", 0, int),
            Member::new("tasks", TASKS_OFFSET, list_head),
            Member::new("pid_link", PID_LINK_OFFSET, hlist_node),
            Member::new("nulls_link", NULLS_LINK_OFFSET, nulls_node),
            Member::new("comm", COMM_OFFSET, comm),
            Member::new("parent", PARENT_OFFSET, task_ptr),
        ],
    )
    .unwrap();

    let page = b.structure("page", 16, vec![Member::new("flags", 0, ulong), Member::new("index", 8, ulong)]);
    let page_ptr = b.pointer(Some(page));

    let slots = b.array(void_ptr, Some(4));
    let node = b.structure(
        "radix_tree_node",
        40,
        vec![
            Member::new("height", 0, uint),
            Member::new("count", 4, uint),
            Member::new("slots", 8, slots),
        ],
    );
    let node_ptr = b.pointer(Some(node));
    let root = b.structure(
        "radix_tree_root",
        16,
        vec![Member::new("height", 0, uint), Member::new("rnode", 8, node_ptr)],
    );

    let sops = b.structure("super_operations", 8, vec![Member::new("statfs", 0, void_ptr)]);
    let sops_ptr = b.pointer(Some(sops));
    let sb = b.structure("super_block", 8, vec![Member::new("s_op", 0, sops_ptr)]);
    let sb_ptr = b.pointer(Some(sb));
    let inode = b.structure("inode", 16, vec![Member::new("i_ino", 0, ulong), Member::new("i_sb", 8, sb_ptr)]);
    b.structure(
        "shmem_inode_info",
        32,
        vec![Member::new("flags", 0, ulong), Member::new("vfs_inode", 16, inode)],
    );
    b.structure("proc_inode", 24, vec![Member::new("pid", 0, int), Member::new("vfs_inode", 8, inode)]);

    let holder = b.structure(
        "holder",
        16,
        vec![
            Member::new("kind", 0, int),
            Member::with_candidates(
                "payload",
                8,
                vec![
                    Candidate::with_rule(ulong, CandidateRule::AtMost(0xffff)),
                    Candidate::with_rule(page_ptr, CandidateRule::NonNull),
                ],
            ),
        ],
    );

    let sect_attr = b.structure(
        "module_sect_attr",
        16,
        vec![Member::new("name", 0, char_ptr), Member::new("address", 8, ulong)],
    );
    let sect_table = b.array(sect_attr, None);
    let sect_attrs = b.structure(
        "module_sect_attrs",
        8,
        vec![Member::new("nsections", 0, uint), Member::new("attrs", 8, sect_table)],
    );
    let sect_attrs_ptr = b.pointer(Some(sect_attrs));
    b.structure(
        "module",
        40,
        vec![
            Member::new("list", 0, list_head),
            Member::new("name", 16, comm),
            Member::new("sect_attrs", 32, sect_attrs_ptr),
        ],
    );

    // Two definitions of the same name, as separately compiled units produce
    b.structure("mutex", 32, vec![Member::new("count", 0, int)]);
    b.structure("mutex", 40, vec![Member::new("count", 0, int), Member::new("owner", 32, task_ptr)]);
    b.function("mutex");
    // and two of the same size, which are not ambiguous
    b.structure("bar", 4, vec![Member::new("value", 0, int)]);
    b.structure("bar", 4, vec![Member::new("flags", 0, uint)]);

    let per_cpu_table = b.array(ulong, Some(4));

    b.symbol("init_task", task, Address::new(INIT_TASK));
    b.symbol("pid_hash", hlist_head, Address::new(PID_HASH));
    b.symbol("nulls_head", nulls_head, Address::new(NULLS_HEAD));
    b.symbol("broken_list", list_head, Address::new(BROKEN_LIST));
    b.symbol("null_list", list_head, Address::new(NULL_LIST));
    b.symbol("page_tree", root, Address::new(PAGE_TREE));
    b.symbol("bad_tree", root, Address::new(BAD_TREE));
    b.symbol("tall_tree", root, Address::new(TALL_TREE));
    b.symbol("empty_tree", root, Address::new(EMPTY_TREE));
    b.symbol("loop_tree", root, Address::new(LOOP_TREE));
    b.symbol("shmem_ops", sops, Address::new(SHMEM_OPS));
    b.symbol("ext4_sops", sops, Address::new(EXT4_SOPS));
    b.module_symbol("proc_sops", sops, "proc", ".rodata", PROC_SOPS_OFFSET);
    b.symbol("__per_cpu_offset", per_cpu_table, Address::new(PER_CPU_OFFSET));
    b.symbol("nr_cpu_ids", uint, Address::new(NR_CPU_IDS));
    b.symbol("runqueues", int, Address::new(RUNQUEUES_TEMPLATE));
    b.symbol("holder_small", holder, Address::new(HOLDER_SMALL));
    b.symbol("holder_pointer", holder, Address::new(HOLDER_POINTER));
    b.symbol("modules", list_head, Address::new(MODULES));

    b.build().unwrap()
}

fn put_comm(memory: &mut Memory, task: u64, name: &str)
{
    let mut comm = [0u8; 16];
    comm[..name.len()].copy_from_slice(name.as_bytes());
    memory.put(task + COMM_OFFSET, &comm);
}

fn put_task(memory: &mut Memory, address: u64, pid: i32, name: &str)
{
    memory.put_i32(address, pid);
    put_comm(memory, address, name);
    memory.put_u64(address + PARENT_OFFSET, INIT_TASK);
}

/// Snapshot with `tasks` tasks after `init_task` on the task list, the pid
/// hash chain and the nulls chain
pub fn memory(tasks: u64) -> Memory
{
    let mut m = Memory::new();

    // Circular task list through init_task
    put_task(&mut m, INIT_TASK, 0, "swapper/0");
    let links: Vec<u64> = std::iter::once(INIT_TASK)
        .chain((1..=tasks).map(task))
        .map(|t| t + TASKS_OFFSET)
        .collect();
    for (j, link) in links.iter().enumerate() {
        let next = links[(j + 1) % links.len()];
        let prev = links[(j + links.len() - 1) % links.len()];
        m.put_u64(*link, next);
        m.put_u64(*link + 8, prev);
    }
    for i in 1..=tasks {
        put_task(&mut m, task(i), i32::try_from(i).unwrap(), &format!("task-{i}"));
    }

    // NULL terminated hlist and nulls list over the same tasks
    let first = if tasks > 0 { task(1) } else { 0 };
    m.put_u64(PID_HASH, if tasks > 0 { first + PID_LINK_OFFSET } else { 0 });
    m.put_u64(NULLS_HEAD, if tasks > 0 { first + NULLS_LINK_OFFSET } else { NULLS_END });
    for i in 1..=tasks {
        let (next, nulls_next) = if i < tasks {
            (task(i + 1) + PID_LINK_OFFSET, task(i + 1) + NULLS_LINK_OFFSET)
        } else {
            (0, NULLS_END)
        };
        m.put_u64(task(i) + PID_LINK_OFFSET, next);
        m.put_u64(task(i) + NULLS_LINK_OFFSET, nulls_next);
    }

    // A list whose tail loops back into itself, and one with a NULL link
    put_task(&mut m, CYCLE_A, 100, "cycle-a");
    put_task(&mut m, CYCLE_B, 101, "cycle-b");
    put_task(&mut m, DANGLING, 102, "dangling");
    m.put_u64(BROKEN_LIST, CYCLE_A + TASKS_OFFSET);
    m.put_u64(CYCLE_A + TASKS_OFFSET, CYCLE_B + TASKS_OFFSET);
    m.put_u64(CYCLE_B + TASKS_OFFSET, CYCLE_A + TASKS_OFFSET);
    m.put_u64(NULL_LIST, DANGLING + TASKS_OFFSET);
    m.put_u64(DANGLING + TASKS_OFFSET, 0);

    put_radix_trees(&mut m);
    put_inodes(&mut m);
    put_modules(&mut m);

    // Two CPUs; the template of `runqueues` holds 7 on CPU 0 and 8 on CPU 1
    m.put_u64(PER_CPU_OFFSET, CPU0_AREA - RUNQUEUES_TEMPLATE);
    m.put_u64(PER_CPU_OFFSET + 8, CPU1_AREA - RUNQUEUES_TEMPLATE);
    m.put_u32(NR_CPU_IDS, 2);
    m.put_i32(CPU0_AREA, 7);
    m.put_i32(CPU1_AREA, 8);

    m.put_i32(HOLDER_SMALL, 1);
    m.put_u64(HOLDER_SMALL + 8, 5);
    m.put_i32(HOLDER_POINTER, 2);
    m.put_u64(HOLDER_POINTER + 8, page(0));

    m
}

fn put_node(memory: &mut Memory, node: u64, height: u32, count: u32, slots: [u64; 4])
{
    memory.put_u32(node, height);
    memory.put_u32(node + 4, count);
    for (i, slot) in slots.iter().enumerate() {
        memory.put_u64(node + 8 + 8 * i as u64, *slot);
    }
}

fn put_radix_trees(m: &mut Memory)
{
    for i in 0..4 {
        m.put_u64(page(i) + 8, i);
    }

    // page_tree: two levels, three reachable pages; one slot still carries
    // the indirect flag and is skipped
    m.put_u32(PAGE_TREE, 2);
    m.put_u64(PAGE_TREE + 8, NODE_TOP | 1);
    put_node(m, NODE_TOP, 2, 2, [NODE_LEFT, 0, NODE_RIGHT, 0]);
    put_node(m, NODE_LEFT, 1, 2, [page(0), page(1), 0, 0]);
    put_node(m, NODE_RIGHT, 1, 2, [0, page(3) | 1, 0, page(2)]);

    // bad_tree: wrong count at the top, child with an impossible height
    m.put_u32(BAD_TREE, 2);
    m.put_u64(BAD_TREE + 8, NODE_BAD_TOP | 1);
    put_node(m, NODE_BAD_TOP, 2, 3, [NODE_LEFT, NODE_BAD_CHILD, 0, 0]);
    put_node(m, NODE_BAD_CHILD, 9, 1, [page(0), 0, 0, 0]);

    m.put_u32(TALL_TREE, 7);
    m.put_u64(TALL_TREE + 8, NODE_TOP | 1);

    m.put_u32(EMPTY_TREE, 0);
    m.put_u64(EMPTY_TREE + 8, 0);

    // loop_tree: the top node lists itself and the same leaf node twice
    m.put_u32(LOOP_TREE, 2);
    m.put_u64(LOOP_TREE + 8, NODE_LOOP | 1);
    put_node(m, NODE_LOOP, 2, 3, [NODE_LOOP, NODE_LEFT, NODE_LEFT, 0]);
}

fn put_inodes(m: &mut Memory)
{
    m.put_u64(SB_SHMEM, SHMEM_OPS);
    m.put_u64(SB_EXT4, EXT4_SOPS);
    m.put_u64(SB_PROC, PROC_RODATA + PROC_SOPS_OFFSET);

    m.put_u64(SHMEM_VFS_INODE, 42);
    m.put_u64(SHMEM_VFS_INODE + 8, SB_SHMEM);
    m.put_u64(EXT4_INODE, 7);
    m.put_u64(EXT4_INODE + 8, SB_EXT4);
    m.put_i32(PROC_INODE_INFO, 1);
    m.put_u64(PROC_VFS_INODE, 9);
    m.put_u64(PROC_VFS_INODE + 8, SB_PROC);
    m.put_u64(ORPHAN_INODE, 3);
    m.put_u64(ORPHAN_INODE + 8, 0);
}

fn put_modules(m: &mut Memory)
{
    let links = [MODULES, MODULE_EXT4, MODULE_PROC];
    for (j, link) in links.iter().enumerate() {
        m.put_u64(*link, links[(j + 1) % links.len()]);
        m.put_u64(*link + 8, links[(j + links.len() - 1) % links.len()]);
    }
    m.put(MODULE_EXT4 + 16, b"ext4\0");
    m.put(MODULE_PROC + 16, b"proc\0");
    m.put_u64(MODULE_PROC + 32, PROC_SECT_ATTRS);

    m.put_u32(PROC_SECT_ATTRS, 2);
    m.put_u64(PROC_SECT_ATTRS + 8, SECTION_NAMES);
    m.put_u64(PROC_SECT_ATTRS + 16, PROC_TEXT);
    m.put_u64(PROC_SECT_ATTRS + 24, SECTION_NAMES + 0x10);
    m.put_u64(PROC_SECT_ATTRS + 32, PROC_RODATA);
    m.put(SECTION_NAMES, b".text\0");
    m.put(SECTION_NAMES + 0x10, b".rodata\0");
}

/// Inspector over a snapshot with `tasks` tasks
pub fn inspector(tasks: u64) -> Inspector
{
    inspector_with(tasks, EngineConfig::default())
}

pub fn inspector_with(tasks: u64, config: EngineConfig) -> Inspector
{
    init_logging();
    let space = MemorySpace::new().with_image(memory(tasks).into_image("vmcore"));
    Inspector::with_config(catalog(), space, config)
}

/// Inspector with a second image in which task 1 has pid 11
pub fn two_images(tasks: u64) -> Inspector
{
    init_logging();
    let mut later = memory(tasks);
    later.put_i32(task(1), 11);
    let space = MemorySpace::new()
        .with_image(memory(tasks).into_image("vmcore"))
        .with_image(later.into_image("vmcore-later"));
    Inspector::new(catalog(), space)
}

/// Section locator that knows where the `proc` unit is loaded
pub fn proc_loaded() -> HashMap<(String, String), Address>
{
    let mut sections = HashMap::new();
    sections.insert(("proc".to_string(), ".rodata".to_string()), Address::new(PROC_RODATA));
    sections
}

pub fn type_id(inspector: &Inspector, name: &str) -> TypeId
{
    inspector.catalog().type_by_name(name).unwrap().id()
}

/// Route engine warnings to the test output; only the first call of the
/// test binary installs the subscriber.
pub fn init_logging()
{
    let _ = kinsight_utils::init_logging_with_level(LogLevel::Warn, LogFormat::Pretty);
}
