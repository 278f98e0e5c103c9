//! Drives the frame ring and draw recording the way `Renderer::draw_frame`
//! does, against a simulated queue.

use std::collections::HashMap;

use terrain_renderer::{
    DescriptorLayout, DescriptorTable, DrawCommands, FrameRing, FrameState, MeshCounts, MeshKind,
    PipelineVariant, RendererConfig, record_draw,
};
use terrain_scene::DrawMode;

/// Timeline values signaled per slot, completed immediately.
#[derive(Default)]
struct SimulatedQueue {
    completed: HashMap<usize, u64>,
}

impl SimulatedQueue {
    fn signal(&mut self, slot: usize, value: u64) {
        let previous = self.completed.insert(slot, value).unwrap_or(0);
        assert!(value > previous, "slot {slot} signaled {value} after {previous}");
    }

    fn completed(&self, slot: usize) -> u64 {
        self.completed.get(&slot).copied().unwrap_or(0)
    }
}

#[derive(Default)]
struct CountingCommands {
    pipelines: Vec<PipelineVariant>,
    tables: Vec<(DescriptorTable, u32)>,
    meshes: Vec<MeshKind>,
    indexed_draws: Vec<u32>,
    draws: Vec<u32>,
}

impl DrawCommands for CountingCommands {
    fn bind_pipeline(&mut self, variant: PipelineVariant) {
        self.pipelines.push(variant);
    }

    fn bind_descriptor_table(&mut self, table: DescriptorTable, set_index: u32) {
        self.tables.push((table, set_index));
    }

    fn bind_mesh(&mut self, mesh: MeshKind) {
        self.meshes.push(mesh);
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.indexed_draws.push(index_count);
    }

    fn draw(&mut self, vertex_count: u32) {
        self.draws.push(vertex_count);
    }
}

const COUNTS: MeshCounts = MeshCounts {
    planet_indices: 61_440,
    grid_indices: 6 * 255 * 127,
};

/// One frame: record, submit with target + 1, present, advance and wait.
fn run_frame(ring: &mut FrameRing, queue: &mut SimulatedQueue, mode: DrawMode) -> CountingCommands {
    let slot = ring.begin_recording().unwrap();
    let signal = ring.target(slot).unwrap() + 1;

    let mut commands = CountingCommands::default();
    record_draw(&mut commands, mode, DescriptorLayout::default(), COUNTS);

    let submitted = ring
        .submit_with(|value| {
            queue.signal(slot, value);
            Ok(())
        })
        .unwrap();
    assert_eq!(submitted, signal);
    ring.present().unwrap();

    let wait = ring.advance().unwrap();
    assert!(queue.completed(wait.slot) >= wait.value);
    ring.finish_wait().unwrap();
    commands
}

#[test]
fn test_every_supported_frame_count_runs() {
    for frame_count in 2..=4 {
        let mut ring = FrameRing::new(frame_count).unwrap();
        let mut queue = SimulatedQueue::default();
        let frames = 5 * frame_count as u64;

        for _ in 0..frames {
            run_frame(&mut ring, &mut queue, DrawMode::Solid);
        }

        assert_eq!(ring.frame_number(), frames);
        assert_eq!(ring.state(), FrameState::Idle);
        for slot in 0..frame_count {
            assert_eq!(ring.target(slot), Some(5));
            assert_eq!(queue.completed(slot), 5);
        }
    }
}

#[test]
fn test_wait_targets_previous_submission_of_the_slot() {
    let mut ring = FrameRing::new(3).unwrap();
    let mut queue = SimulatedQueue::default();

    for frame in 0..12u64 {
        let slot = ring.begin_recording().unwrap();
        assert_eq!(slot as u64, frame % 3);
        ring.submit().unwrap();
        queue.signal(slot, ring.target(slot).unwrap());
        ring.present().unwrap();

        let wait = ring.advance().unwrap();
        assert_eq!(wait.slot as u64, (frame + 1) % 3);
        // The next slot was last submitted three frames ago, or never.
        assert_eq!(wait.value, (frame + 1) / 3);
        ring.finish_wait().unwrap();
    }
}

#[test]
fn test_mode_switch_between_frames_changes_only_the_draw() {
    let mut ring = FrameRing::new(RendererConfig::default().frame_count).unwrap();
    let mut queue = SimulatedQueue::default();

    let solid = run_frame(&mut ring, &mut queue, DrawMode::Solid);
    let wireframe = run_frame(&mut ring, &mut queue, DrawMode::Wireframe);
    let flat = run_frame(&mut ring, &mut queue, DrawMode::Flat3d);
    let preview = run_frame(&mut ring, &mut queue, DrawMode::Preview2d);

    assert_eq!(solid.pipelines, [PipelineVariant::TessSolid]);
    assert_eq!(wireframe.pipelines, [PipelineVariant::TessWireframe]);
    assert_eq!(solid.tables, wireframe.tables);
    assert_eq!(solid.meshes, [MeshKind::Planet]);
    assert_eq!(solid.indexed_draws, [COUNTS.planet_indices]);

    assert_eq!(flat.meshes, [MeshKind::Grid]);
    assert_eq!(flat.indexed_draws, [COUNTS.grid_indices]);

    assert!(preview.meshes.is_empty());
    assert!(preview.indexed_draws.is_empty());
    assert_eq!(preview.draws, [3]);
    assert!(
        preview
            .tables
            .iter()
            .all(|&(table, _)| table != DescriptorTable::Constants)
    );

    assert_eq!(ring.frame_number(), 4);
}
