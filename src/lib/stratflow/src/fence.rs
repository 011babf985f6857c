//! Floating-fence tracking (§4.X, second sentence): a floating fence's
//! `k_low` tracks `z_srf - width` on every surface update; fixed fences keep
//! their initial k-range untouched.

use crate::domain::Domain;

/// Recompute `k_low` for every floating fence from the current surface
/// elevation. Called after [`crate::mesh::Mesh::update_surface_layer`].
pub fn update_floating_fences(dom: &mut Domain) {
    let mesh = &dom.mesh;
    let z_srf = mesh.z_srf;
    let k_srf = mesh.k_srf;
    let nz = mesh.nz;
    let z = mesh.z.clone();

    for fence in &mut dom.fences {
        if !fence.floating {
            continue;
        }
        let z_low = z_srf - fence.width;
        let mut k_low = 1;
        while k_low < nz && z[k_low] < z_low {
            k_low += 1;
        }
        fence.k_low = k_low.min(k_srf).max(1);
        fence.k_high = k_srf;
    }
}
