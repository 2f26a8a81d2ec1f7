//! Drop scene: a deformable lattice falling over tilted cubes onto a floor,
//! with both self-collisions and kinematic contact active.
//!
//! Usage: scenes [steps] [obj-output-dir]

use solid::io;
use solid::mesh::generate::cube_lattice;
use solid::prelude::*;
use std::path::PathBuf;
use tracing::info;

fn build_mesh() -> TetMesh {
    let (vertices, tets) = cube_lattice(3, 1.0, Vec3::new(-0.5, 1.0, -0.5));
    TetMesh::new(vertices, tets).expect("lattice is well-formed")
}

fn main() {
    solid::init_logging();

    let mut args = std::env::args().skip(1);
    let steps: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(300);
    let output: Option<PathBuf> = args.next().map(PathBuf::from);

    let mut mesh = build_mesh();

    let e = 6.0;
    let nu = 0.45;
    let mu = lame_mu(e, nu);
    let lambda = lame_lambda(e, nu);
    info!("mu: {}", mu);
    info!("lambda: {}", lambda);

    let mut solver = BackwardEulerVelocity::new(&mesh, Box::new(Snh::new(mu, lambda)));
    solver.set_timestep(1.0 / 60.0);
    solver.set_collision_stiffness(1000.0);
    solver.set_collision_damping_beta(0.01);
    solver.set_vertex_face_self_collisions(true);
    solver.set_edge_edge_self_collisions(true);
    solver.add_gravity(&Vec3::new(0.0, -1.0, 0.0));

    info!(
        "solver config: {}",
        serde_json::to_string(solver.config()).expect("config serializes")
    );

    // floor
    let floor = solver.add_shape(Box::new(Cube::new(Vec3::new(0.0, -10.0, 0.0), 10.0)));
    solver.add_kinematic_collision_object(floor);

    // a short staircase of tilted cubes under the drop
    let tilt = nalgebra::Rotation3::from_axis_angle(
        &nalgebra::Vector3::z_axis(),
        std::f64::consts::FRAC_PI_4,
    )
    .into_inner();
    for center in [
        Vec3::new(-1.0, 0.0, 0.25),
        Vec3::new(1.0, -0.75, 0.25),
    ] {
        let id = solver.add_shape(Box::new(Cube::new(center, 1.0)));
        solver.shape_mut(id).frame_mut().set_rotation(tilt);
        solver.add_kinematic_collision_object(id);
    }

    for step in 0..steps {
        solver.solve(&mut mesh);

        if step % 30 == 0 {
            let (mins, maxs) = mesh.bounding_box();
            info!(
                "step {:4}: y in [{:.3}, {:.3}], {} plane constraints, {} vf / {} ee pairs, pcg {} iters (err {:.2e})",
                step,
                mins[1],
                maxs[1],
                solver.plane_constraints().len(),
                mesh.vertex_face_collisions().len(),
                mesh.edge_edge_collisions().len(),
                solver.pcg_iterations(),
                solver.pcg_residual(),
            );
        }

        if let Some(dir) = &output {
            if step % 20 == 0 {
                std::fs::create_dir_all(dir).expect("create output directory");
                let path = dir.join(format!("frame_{:04}.obj", step));
                io::write_surface_obj(&path, &mesh).expect("OBJ write");
            }
        }
    }

    let (mins, maxs) = mesh.bounding_box();
    info!(
        "finished {} steps; final bounds y in [{:.3}, {:.3}]",
        steps, mins[1], maxs[1]
    );
}
