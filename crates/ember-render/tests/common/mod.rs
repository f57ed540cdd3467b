// SPDX-License-Identifier: CEPL-1.0
//! Scripted in-memory backend and window. Every call is logged and GPU work
//! "completes" only when the CPU waits on its fence, which makes ordering
//! mistakes visible as recorded violations.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use anyhow::{anyhow, Result};
use ember_render::{
    AcquireOutcome, Backend, DrawArea, ImageSetDesc, PresentOutcome, RenderSize, SurfaceCaps,
    WindowSurface,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sem(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fence(pub u64);

#[derive(Debug)]
pub struct MockSet {
    pub id: u64,
    pub extent: RenderSize,
    pub count: u32,
}

#[derive(Debug)]
pub struct MockTargets {
    pub id: u64,
    pub set: u64,
    pub image: u32,
    pub recorded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    CreateSemaphore(Sem),
    CreateFence(Fence),
    DestroySemaphore(Sem),
    DestroyFence(Fence),
    Wait(Vec<Fence>),
    Reset(Fence),
    QueryCaps,
    CreateSet { id: u64, extent: RenderSize, min_count: u32 },
    DestroySet(u64),
    CreateTargets { id: u64, set: u64, image: u32 },
    Record { id: u64 },
    DestroyTargets { id: u64, image: u32 },
    Acquire { available: Sem },
    Submit { image: u32, targets: u64, ready: Fence },
    Present { image: u32 },
}

/// How a wait found a fence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitSeen {
    AlreadySignaled,
    CompletedSubmission,
}

#[derive(Debug)]
pub struct MockState {
    pub calls: Vec<Call>,
    pub violations: Vec<String>,
    pub waits: Vec<(Fence, WaitSeen)>,

    pub caps: SurfaceCaps<()>,
    /// Images actually created per set; `None` honours the request.
    pub actual_image_count: Option<u32>,
    pub acquire_script: VecDeque<AcquireOutcome>,
    pub present_script: VecDeque<PresentOutcome>,
    /// Fail the n-th sync primitive creation (0-based, semaphores and fences together).
    pub fail_sync_create_at: Option<usize>,
    /// Fail recording for this image index.
    pub fail_record_image: Option<u32>,

    next_id: u64,
    sync_created: usize,
    next_image: u32,
    fences: BTreeMap<Fence, bool>,
    semaphores: BTreeSet<Sem>,
    signaled_sems: BTreeSet<Sem>,
    sets: BTreeSet<u64>,
    targets: BTreeMap<u64, u64>,
    in_flight: Vec<(Fence, u64)>,
}

impl MockState {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn violation(&mut self, msg: String) {
        self.violations.push(msg);
    }

    pub fn live_objects(&self) -> usize {
        self.fences.len() + self.semaphores.len() + self.sets.len() + self.targets.len()
    }

    pub fn live_sets(&self) -> usize {
        self.sets.len()
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.iter().position(pred)
    }

    pub fn fence_ids(&self) -> Vec<Fence> {
        self.fences.keys().copied().collect()
    }

    pub fn semaphore_ids(&self) -> Vec<Sem> {
        self.semaphores.iter().copied().collect()
    }
}

#[derive(Clone)]
pub struct MockBackend {
    pub state: Rc<RefCell<MockState>>,
}

impl MockBackend {
    pub fn new(min_image_count: u32) -> Self {
        let state = MockState {
            calls: Vec::new(),
            violations: Vec::new(),
            waits: Vec::new(),
            caps: SurfaceCaps {
                min_image_count,
                max_image_count: 8,
                min_extent: RenderSize::new(1, 1),
                max_extent: RenderSize::new(4096, 4096),
                native: (),
            },
            actual_image_count: None,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            fail_sync_create_at: None,
            fail_record_image: None,
            next_id: 0,
            sync_created: 0,
            next_image: 0,
            fences: BTreeMap::new(),
            semaphores: BTreeSet::new(),
            signaled_sems: BTreeSet::new(),
            sets: BTreeSet::new(),
            targets: BTreeMap::new(),
            in_flight: Vec::new(),
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn handle(&self) -> Rc<RefCell<MockState>> {
        Rc::clone(&self.state)
    }

    fn sync_budget(&self) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let n = s.sync_created;
        s.sync_created += 1;
        if s.fail_sync_create_at == Some(n) {
            return Err(anyhow!("VK_ERROR_OUT_OF_DEVICE_MEMORY"));
        }
        Ok(())
    }
}

impl Backend for MockBackend {
    type Semaphore = Sem;
    type Fence = Fence;
    type NativeCaps = ();
    type ImageSet = MockSet;
    type ImageTargets = MockTargets;

    fn create_semaphore(&mut self) -> Result<Sem> {
        self.sync_budget()?;
        let mut s = self.state.borrow_mut();
        let sem = Sem(s.id());
        s.semaphores.insert(sem);
        s.calls.push(Call::CreateSemaphore(sem));
        Ok(sem)
    }

    fn create_fence(&mut self, signaled: bool) -> Result<Fence> {
        self.sync_budget()?;
        let mut s = self.state.borrow_mut();
        let fence = Fence(s.id());
        s.fences.insert(fence, signaled);
        s.calls.push(Call::CreateFence(fence));
        Ok(fence)
    }

    fn destroy_semaphore(&mut self, sem: Sem) {
        let mut s = self.state.borrow_mut();
        if !s.semaphores.remove(&sem) {
            s.violation(format!("{sem:?} destroyed twice or never created"));
        }
        s.calls.push(Call::DestroySemaphore(sem));
    }

    fn destroy_fence(&mut self, fence: Fence) {
        let mut s = self.state.borrow_mut();
        if s.in_flight.iter().any(|(f, _)| *f == fence) {
            s.violation(format!("{fence:?} destroyed while its submission is in flight"));
        }
        if s.fences.remove(&fence).is_none() {
            s.violation(format!("{fence:?} destroyed twice or never created"));
        }
        s.calls.push(Call::DestroyFence(fence));
    }

    fn wait_for_fences(&mut self, fences: &[Fence], _timeout_ns: u64) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::Wait(fences.to_vec()));
        for &fence in fences {
            match s.fences.get(&fence).copied() {
                None => s.violation(format!("wait on unknown {fence:?}")),
                Some(true) => s.waits.push((fence, WaitSeen::AlreadySignaled)),
                Some(false) => {
                    let before = s.in_flight.len();
                    s.in_flight.retain(|(f, _)| *f != fence);
                    if s.in_flight.len() == before {
                        s.violation(format!("wait on reset {fence:?} with no submission: deadlock"));
                    }
                    s.fences.insert(fence, true);
                    s.waits.push((fence, WaitSeen::CompletedSubmission));
                }
            }
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: Fence) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::Reset(fence));
        match s.fences.get(&fence).copied() {
            Some(true) => {
                s.fences.insert(fence, false);
            }
            Some(false) => s.violation(format!("{fence:?} reset while not signalled")),
            None => s.violation(format!("reset of unknown {fence:?}")),
        }
        Ok(())
    }

    fn surface_capabilities(&mut self) -> Result<SurfaceCaps<()>> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::QueryCaps);
        Ok(s.caps.clone())
    }

    fn create_image_set(&mut self, _caps: &SurfaceCaps<()>, desc: &ImageSetDesc) -> Result<MockSet> {
        let mut s = self.state.borrow_mut();
        let id = s.id();
        s.sets.insert(id);
        s.calls.push(Call::CreateSet {
            id,
            extent: desc.extent,
            min_count: desc.min_image_count,
        });
        let count = s.actual_image_count.unwrap_or(desc.min_image_count);
        s.next_image = 0;
        Ok(MockSet {
            id,
            extent: desc.extent,
            count,
        })
    }

    fn image_count(&mut self, set: &MockSet) -> Result<u32> {
        Ok(set.count)
    }

    fn destroy_image_set(&mut self, set: MockSet) {
        let mut s = self.state.borrow_mut();
        if s.targets.values().any(|&owner| owner == set.id) {
            s.violation(format!("image set {} destroyed before its targets", set.id));
        }
        s.sets.remove(&set.id);
        s.calls.push(Call::DestroySet(set.id));
    }

    fn create_image_targets(
        &mut self,
        set: &MockSet,
        image_index: u32,
        _area: &DrawArea,
    ) -> Result<MockTargets> {
        let mut s = self.state.borrow_mut();
        let id = s.id();
        s.targets.insert(id, set.id);
        s.calls.push(Call::CreateTargets {
            id,
            set: set.id,
            image: image_index,
        });
        Ok(MockTargets {
            id,
            set: set.id,
            image: image_index,
            recorded: false,
        })
    }

    fn record_image_commands(&mut self, targets: &mut MockTargets, _area: &DrawArea) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::Record { id: targets.id });
        if s.fail_record_image == Some(targets.image) {
            return Err(anyhow!("end_command_buffer: VK_ERROR_OUT_OF_HOST_MEMORY"));
        }
        targets.recorded = true;
        Ok(())
    }

    fn destroy_image_targets(&mut self, targets: MockTargets) {
        let mut s = self.state.borrow_mut();
        if s.in_flight.iter().any(|(_, t)| *t == targets.id) {
            s.violation(format!(
                "targets of image {} destroyed while a submission using them is in flight",
                targets.image
            ));
        }
        s.targets.remove(&targets.id);
        s.calls.push(Call::DestroyTargets {
            id: targets.id,
            image: targets.image,
        });
    }

    fn acquire_next_image(
        &mut self,
        set: &MockSet,
        available: Sem,
        _timeout_ns: u64,
    ) -> Result<AcquireOutcome> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::Acquire { available });
        let outcome = match s.acquire_script.pop_front() {
            Some(o) => o,
            None => {
                let image_index = s.next_image % set.count;
                s.next_image += 1;
                AcquireOutcome::Acquired {
                    image_index,
                    suboptimal: false,
                }
            }
        };
        if let AcquireOutcome::Acquired { .. } = outcome {
            if !s.signaled_sems.insert(available) {
                s.violation(format!("{available:?} signalled again before being waited on"));
            }
        }
        Ok(outcome)
    }

    fn submit(
        &mut self,
        targets: &MockTargets,
        available: Sem,
        finished: Sem,
        ready: Fence,
    ) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::Submit {
            image: targets.image,
            targets: targets.id,
            ready,
        });
        if !targets.recorded {
            s.violation(format!("image {} submitted without recorded commands", targets.image));
        }
        if !s.signaled_sems.remove(&available) {
            s.violation(format!("submit waits on {available:?} which nothing signals"));
        }
        if s.fences.get(&ready).copied() != Some(false) {
            s.violation(format!("submit with {ready:?} not reset"));
        }
        s.signaled_sems.insert(finished);
        s.in_flight.push((ready, targets.id));
        Ok(())
    }

    fn present(&mut self, _set: &MockSet, image_index: u32, finished: Sem) -> Result<PresentOutcome> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::Present { image: image_index });
        if !s.signaled_sems.remove(&finished) {
            s.violation(format!("present waits on {finished:?} which nothing signals"));
        }
        Ok(s
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }
}

/// Window whose drawable size follows a script, one entry per poll.
pub struct ScriptedWindow {
    sizes: Vec<RenderSize>,
    polls: usize,
    close_after_polls: Option<usize>,
}

impl ScriptedWindow {
    pub fn fixed(size: RenderSize) -> Self {
        Self::scripted(vec![size])
    }

    /// `sizes[0]` is reported before the first poll, `sizes[n]` after the n-th;
    /// the last entry repeats.
    pub fn scripted(sizes: Vec<RenderSize>) -> Self {
        assert!(!sizes.is_empty());
        Self {
            sizes,
            polls: 0,
            close_after_polls: None,
        }
    }

    pub fn closing_after(mut self, polls: usize) -> Self {
        self.close_after_polls = Some(polls);
        self
    }

    pub fn polls(&self) -> usize {
        self.polls
    }
}

impl WindowSurface for ScriptedWindow {
    fn drawable_size(&self) -> RenderSize {
        self.sizes[self.polls.min(self.sizes.len() - 1)]
    }

    fn should_close(&self) -> bool {
        self.close_after_polls.is_some_and(|n| self.polls >= n)
    }

    fn poll_events(&mut self) {
        self.polls += 1;
    }
}
