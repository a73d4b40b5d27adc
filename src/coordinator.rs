//! # Coordinator
//!
//! Builds the whole system from the static arena, in dependency order:
//!
//! ```text
//! mymutex1 ─► recmutex ─► my_q1 ─► sb1 ─► mytask2 ─► mytask3 ─► mytask1
//! └──────────── primitives ───────────┘   └──────── tasks ─────────────┘
//! ```
//!
//! task1 is created last because it needs task2's handle to resume it.
//! The first failing step aborts initialization with the resource it was
//! building. Nothing built before it is torn down: the arena is never
//! reclaimed, so restarting the whole program is the only recovery.

use core::fmt;

use crate::app::{self, AppContext, Telemetry};
use crate::arena::{Block, QueueStorage, StreamStorage, TaskStack};
use crate::board::Board;
use crate::config::STACK_SIZE;
use crate::error::ConstructionFailure;
use crate::executor::Executor;
use crate::kernel::Kernel;
use crate::sync::{
    Mutex, MutexControl, Queue, QueueControl, RecursiveMutex, RecursiveMutexControl, StreamBuffer,
    StreamControl,
};
use crate::task::TaskId;
use crate::trace;

// ---------------------------------------------------------------------------
// Static resources
// ---------------------------------------------------------------------------

/// Every block the system is built from. Meant to live in a `static`.
pub struct StaticResources {
    pub kernel: Kernel,
    pub telemetry: Telemetry,
    task1_stack: Block<TaskStack<STACK_SIZE>>,
    task2_stack: Block<TaskStack<STACK_SIZE>>,
    task3_stack: Block<TaskStack<STACK_SIZE>>,
    mutex1: Block<MutexControl>,
    mutex2: Block<RecursiveMutexControl>,
    q1_control: Block<QueueControl<u64>>,
    q1_storage: Block<QueueStorage<u64, { app::Q1_LENGTH }>>,
    sb1_control: Block<StreamControl>,
    sb1_storage: Block<StreamStorage<{ app::SB1_STORAGE_BYTES }>>,
}

impl StaticResources {
    pub const fn new() -> Self {
        Self {
            kernel: Kernel::new(),
            telemetry: Telemetry::new(),
            task1_stack: Block::new(TaskStack::new()),
            task2_stack: Block::new(TaskStack::new()),
            task3_stack: Block::new(TaskStack::new()),
            mutex1: Block::new(MutexControl::new()),
            mutex2: Block::new(RecursiveMutexControl::new()),
            q1_control: Block::new(QueueControl::new()),
            q1_storage: Block::new(QueueStorage::new()),
            sb1_control: Block::new(StreamControl::new()),
            sb1_storage: Block::new(StreamStorage::new()),
        }
    }
}

impl Default for StaticResources {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Construction step, in initialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Mutex1,
    RecursiveMutex,
    Queue1,
    StreamBuffer1,
    Task2,
    Task3,
    Task1,
}

impl Resource {
    pub const fn name(self) -> &'static str {
        match self {
            Resource::Mutex1 => app::MUTEX1_NAME,
            Resource::RecursiveMutex => app::MUTEX2_NAME,
            Resource::Queue1 => app::Q1_NAME,
            Resource::StreamBuffer1 => app::SB1_NAME,
            Resource::Task2 => app::TASK2_NAME,
            Resource::Task3 => app::TASK3_NAME,
            Resource::Task1 => app::TASK1_NAME,
        }
    }

    /// Non-zero boot code identifying the failed step.
    pub const fn code(self) -> i32 {
        match self {
            Resource::Mutex1 => 1,
            Resource::RecursiveMutex => 2,
            Resource::Queue1 => 3,
            Resource::StreamBuffer1 => 4,
            Resource::Task2 => 5,
            Resource::Task3 => 6,
            Resource::Task1 => 7,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Initialization stopped at `resource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("failed to construct {resource}: {cause}")]
pub struct InitError {
    pub resource: Resource,
    #[source]
    pub cause: ConstructionFailure,
}

impl InitError {
    fn at(resource: Resource) -> impl FnOnce(ConstructionFailure) -> Self {
        move |cause| Self { resource, cause }
    }

    pub const fn code(&self) -> i32 {
        self.resource.code()
    }
}

/// Boot status: 0 on full success, the failing resource's code otherwise.
pub fn exit_code<T>(result: &Result<T, InitError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

/// The running system: the executor that owns the task bodies, the shared
/// context and the task handles.
pub struct System<'a> {
    pub executor: Executor<'a>,
    pub context: AppContext<'a>,
    pub task1: TaskId,
    pub task2: TaskId,
    pub task3: TaskId,
}

/// Construct every primitive, then every task, from `res`.
pub fn initialize<'a>(res: &'a StaticResources, board: &'a dyn Board) -> Result<System<'a>, InitError> {
    build(res, board).inspect_err(|e| tracing::error!("initialization failed: {}", e))
}

fn build<'a>(res: &'a StaticResources, board: &'a dyn Board) -> Result<System<'a>, InitError> {
    let kernel = &res.kernel;

    let mutex1 = Mutex::new(kernel, res.mutex1.claim().map_err(InitError::at(Resource::Mutex1))?);
    trace::register(&mutex1, app::MUTEX1_NAME);

    let mutex2 = RecursiveMutex::new(
        kernel,
        res.mutex2.claim().map_err(InitError::at(Resource::RecursiveMutex))?,
    );
    trace::register(&mutex2, app::MUTEX2_NAME);

    let q1 = Queue::new(
        kernel,
        res.q1_control.claim().map_err(InitError::at(Resource::Queue1))?,
        res.q1_storage.claim().map_err(InitError::at(Resource::Queue1))?,
    )
    .map_err(InitError::at(Resource::Queue1))?;
    trace::register(&q1, app::Q1_NAME);

    let sb1 = StreamBuffer::new(
        kernel,
        res.sb1_control.claim().map_err(InitError::at(Resource::StreamBuffer1))?,
        res.sb1_storage.claim().map_err(InitError::at(Resource::StreamBuffer1))?,
        app::SB1_TRIGGER_LEVEL,
    )
    .map_err(InitError::at(Resource::StreamBuffer1))?;
    trace::register(&sb1, app::SB1_NAME);

    let context = AppContext {
        kernel,
        board,
        mutex1,
        mutex2,
        q1,
        sb1,
        telemetry: &res.telemetry,
    };

    let mut executor = Executor::new(kernel);
    let task2 = executor
        .spawn(
            app::TASK2_NAME,
            app::TASK2_PRIORITY,
            res.task2_stack.claim().map_err(InitError::at(Resource::Task2))?,
            app::task2(context),
        )
        .map_err(InitError::at(Resource::Task2))?;
    let task3 = executor
        .spawn(
            app::TASK3_NAME,
            app::TASK3_PRIORITY,
            res.task3_stack.claim().map_err(InitError::at(Resource::Task3))?,
            app::task3(context),
        )
        .map_err(InitError::at(Resource::Task3))?;
    let task1 = executor
        .spawn(
            app::TASK1_NAME,
            app::TASK1_PRIORITY,
            res.task1_stack.claim().map_err(InitError::at(Resource::Task1))?,
            app::task1(context, task2),
        )
        .map_err(InitError::at(Resource::Task1))?;

    tracing::info!("system initialized: {} tasks", kernel.task_count());
    Ok(System {
        executor,
        context,
        task1,
        task2,
        task3,
    })
}
