// CLASSIFICATION: COMMUNITY
// Filename: cluster.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-04-02

//! End-to-end cluster scenarios: a master and a fleet of workers over real
//! sockets on the loopback interface, rendering the demo scene into a film
//! that is checked against the in-process reference integrator.

use std::net::SocketAddr;
use std::time::Duration;

use glam::IVec2;

use swarmtrace::master::assign::Assignment;
use swarmtrace::master::{Master, MasterConfig, Summary};
use swarmtrace::scene::manifest::{demo_scene, SceneSetup};
use swarmtrace::scene::reference;
use swarmtrace::storage::open_backend;
use swarmtrace::worker::{Worker, WorkerConfig};

struct Cluster {
    summary: Summary,
    setup: SceneSetup,
}

async fn run_cluster(
    resolution: i32,
    treelet_count: u32,
    spp: u32,
    workers: u32,
    assignment: Assignment,
    reliable: bool,
) -> anyhow::Result<Cluster> {
    let dir = tempfile::tempdir()?;
    let storage_uri = format!("file://{}", dir.path().join("store").display());

    let setup = demo_scene(IVec2::new(resolution, resolution), treelet_count, spp);
    setup.store(&*open_backend(&storage_uri)?)?;

    let master = Master::bind(MasterConfig {
        scene_path: dir.path().join("out"),
        listen_port: 0,
        public_ip: "127.0.0.1".into(),
        storage_uri: storage_uri.clone(),
        num_workers: workers,
        aws_region: "test-local".into(),
        assignment,
        treelet_stats: false,
        worker_stats: false,
        collect_diagnostics: false,
        complete_topology: false,
        seed: Some(7),
    })
    .await?;
    let coordinator = SocketAddr::new("127.0.0.1".parse()?, master.local_addr()?.port());
    let master_task = tokio::spawn(master.run());

    for index in 0..workers {
        let worker = Worker::connect(WorkerConfig {
            coordinator,
            storage_uri: storage_uri.clone(),
            send_reliably: reliable,
            scratch_dir: dir.path().join(format!("scratch-{index}")),
            log_stream: format!("test-worker-{index}"),
            seed: Some(1000 + u64::from(index)),
        })
        .await?;
        tokio::spawn(worker.run());
    }

    let summary = tokio::time::timeout(Duration::from_secs(60), master_task)
        .await
        .expect("cluster run timed out")??;
    Ok(Cluster { summary, setup })
}

fn assert_films_equal(cluster: &Cluster, resolution: i32) {
    let reference = reference::render(&cluster.setup);
    for y in 0..resolution {
        for x in 0..resolution {
            let got = cluster.summary.film.pixel(x, y);
            let want = reference.pixel(x, y);
            assert_eq!(got, want, "pixel ({x}, {y})");
        }
    }
}

fn assert_films_close(cluster: &Cluster, resolution: i32) {
    let reference = reference::render(&cluster.setup);
    for y in 0..resolution {
        for x in 0..resolution {
            let got = cluster.summary.film.pixel(x, y);
            let want = reference.pixel(x, y);
            for (a, b) in [(got.r, want.r), (got.g, want.g), (got.b, want.b)] {
                assert!(
                    (a - b).abs() <= 1e-4 * b.abs().max(1.0),
                    "pixel ({x}, {y}): {got:?} vs {want:?}"
                );
            }
        }
    }
}

// S1: one worker, root treelet only. No peer traffic; the film matches the
// non-distributed trace bit-exactly at integer pixel positions.
#[tokio::test]
async fn single_worker_matches_reference_exactly() {
    let cluster = run_cluster(4, 1, 1, 1, Assignment::Uniform, false)
        .await
        .unwrap();
    assert_eq!(cluster.summary.total_paths, 16);
    assert_eq!(cluster.summary.finished_paths, 16);
    assert_eq!(cluster.summary.sent_rays, 0);
    assert_films_equal(&cluster, 4);
}

// S2: two workers, two treelets under Uniform both resolve to {0, 1}, so no
// rays are ever shipped.
#[tokio::test]
async fn uniform_replication_avoids_peer_traffic() {
    let cluster = run_cluster(8, 2, 1, 2, Assignment::Uniform, false)
        .await
        .unwrap();
    assert_eq!(cluster.summary.finished_paths, 64);
    assert_eq!(cluster.summary.sent_rays, 0);
    assert_films_equal(&cluster, 8);
}

// S3: three workers, three treelets. The rotation leaves each worker blind
// to one leaf, so rays must cross the mesh; the film still matches the
// reference within float-sum reordering tolerance.
#[tokio::test]
async fn three_workers_route_rays_across_the_mesh() {
    let cluster = run_cluster(8, 3, 1, 3, Assignment::Uniform, true)
        .await
        .unwrap();
    assert_eq!(cluster.summary.finished_paths, 64);
    assert!(
        cluster.summary.sent_rays > 0,
        "expected cross-worker traffic, got none"
    );
    assert_eq!(cluster.summary.sent_rays, cluster.summary.received_rays);
    assert_films_close(&cluster, 8);
}

// Static packing places each leaf with exactly one owner and the job still
// completes.
#[tokio::test]
async fn static_assignment_renders_to_completion() {
    let cluster = run_cluster(8, 3, 1, 2, Assignment::Static, true)
        .await
        .unwrap();
    assert_eq!(cluster.summary.finished_paths, 64);
    assert_films_close(&cluster, 8);
}

// S5: Static packing that cannot cover every treelet fails before any
// worker is accepted.
#[tokio::test]
async fn infeasible_static_assignment_fails_at_bind() {
    let dir = tempfile::tempdir().unwrap();
    let storage_uri = format!("file://{}", dir.path().join("store").display());
    let setup = demo_scene(IVec2::new(8, 8), 4, 1);
    setup.store(&*open_backend(&storage_uri).unwrap()).unwrap();

    let err = Master::bind(MasterConfig {
        scene_path: dir.path().join("out"),
        listen_port: 0,
        public_ip: "127.0.0.1".into(),
        storage_uri,
        num_workers: 2,
        aws_region: "test-local".into(),
        assignment: Assignment::Static,
        treelet_stats: false,
        worker_stats: false,
        collect_diagnostics: false,
        complete_topology: false,
        seed: Some(7),
    })
    .await
    .unwrap_err();
    assert!(err.to_string().contains("unassigned treelets"), "{err}");
}
