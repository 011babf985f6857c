use crate::error::{Result, StratflowError};

/// Staggered finite-volume geometry for one domain, plus the moving surface
/// layer (§4.G).
///
/// Faces run over `0..=nx` (x) and `0..=nz` (z); cell centers run over
/// `1..=nx` and `1..=nz`. Every dense table below is stored flat,
/// column-major (x varies fastest) exactly as the data model mandates.
/// `*0` tables freeze the immobile-surface reference geometry; the plain
/// (`au`, `aw`, `vol`, ...) tables equal the reference outside the surface
/// row and are rebuilt for `k_srf` by [`Mesh::update_surface_layer`].
#[derive(Clone, Debug)]
pub struct Mesh {
    pub nx: usize,
    pub nz: usize,

    pub x: Vec<f64>,
    pub z: Vec<f64>,
    pub dx: Vec<f64>,
    pub dz: Vec<f64>,
    pub dxs: Vec<f64>,
    pub dzs: Vec<f64>,

    /// Width at node `(i, k)`, flat `(nx+1) * (nz+1)`.
    pub b: Vec<f64>,
    pub z_bed: Vec<f64>,
    pub k_bot: Vec<usize>,
    pub kc_bot: Vec<usize>,

    /// u-face area (x-normal), flat `(nx+1) * nz`, row k at `(i, k)` stored
    /// at `k - 1` along the z axis (k ranges 1..=nz).
    pub au: Vec<f64>,
    /// w-face area (z-normal), flat `nx * (nz+1)`, i ranges 1..=nx.
    pub aw: Vec<f64>,
    pub aus: Vec<f64>,
    pub aws: Vec<f64>,
    pub vol: Vec<f64>,
    pub vols: Vec<f64>,

    pub dz0: Vec<f64>,
    pub au0: Vec<f64>,
    pub aw0: Vec<f64>,
    pub aus0: Vec<f64>,
    pub aws0: Vec<f64>,
    pub vol0: Vec<f64>,
    pub vols0: Vec<f64>,

    pub vol_hgt: Vec<f64>,
    pub area_hgt: Vec<f64>,
    pub len_hgt: Vec<f64>,

    pub z_srf: f64,
    pub k_srf: usize,
    pub dz_srf: f64,
    pub w_srf: f64,
    pub total_vol: f64,
    pub q_total_vol: f64,
}

impl Mesh {
    #[inline]
    pub fn b_at(&self, i: usize, k: usize) -> f64 {
        self.b[k * (self.nx + 1) + i]
    }

    #[inline]
    fn b_at_mut(&mut self, i: usize, k: usize) -> &mut f64 {
        let nx1 = self.nx + 1;
        &mut self.b[k * nx1 + i]
    }

    #[inline]
    pub fn au_at(&self, i: usize, k: usize) -> f64 {
        self.au[(k - 1) * (self.nx + 1) + i]
    }

    #[inline]
    pub fn au_at_mut(&mut self, i: usize, k: usize) -> &mut f64 {
        let nx1 = self.nx + 1;
        &mut self.au[(k - 1) * nx1 + i]
    }

    #[inline]
    pub fn aw_at(&self, i: usize, k: usize) -> f64 {
        self.aw[k * self.nx + (i - 1)]
    }

    #[inline]
    pub fn aw_at_mut(&mut self, i: usize, k: usize) -> &mut f64 {
        let nx = self.nx;
        &mut self.aw[k * nx + (i - 1)]
    }

    #[inline]
    pub fn vol_at(&self, i: usize, k: usize) -> f64 {
        self.vol[(k - 1) * self.nx + (i - 1)]
    }

    #[inline]
    pub fn vol_at_mut(&mut self, i: usize, k: usize) -> &mut f64 {
        let nx = self.nx;
        &mut self.vol[(k - 1) * nx + (i - 1)]
    }

    /// Cell-center elevation of layer `k` (mean of the bounding faces).
    pub fn zc(&self, k: usize) -> f64 {
        0.5 * (self.z[k - 1] + self.z[k])
    }

    /// Build the full geometry table from raw nodes, exactly §4.G's first
    /// paragraph: width above the bed is clamped forward from the highest
    /// wet node so dry cells inherit a valid width, `k_bot` is the smallest
    /// wet center index, `len_hgt` interpolates across the first bed
    /// segment crossed at each elevation.
    pub fn build(x: Vec<f64>, z: Vec<f64>, mut b: Vec<f64>, z_bed: Vec<f64>) -> Result<Mesh> {
        let nx = x.len() - 1;
        let nz = z.len() - 1;
        if z_bed.len() != nx + 1 {
            return Err(StratflowError::config("z_bed length must equal nx+1"));
        }
        if b.len() != (nx + 1) * (nz + 1) {
            return Err(StratflowError::config("width matrix size must equal (nx+1)*(nz+1)"));
        }
        for w in x.windows(2) {
            if w[1] <= w[0] {
                return Err(StratflowError::config("x nodes must be strictly increasing"));
            }
        }
        for w in z.windows(2) {
            if w[1] <= w[0] {
                return Err(StratflowError::config("z nodes must be strictly increasing"));
            }
        }

        // k_bot[i]: smallest k with zc(k) >= z_bed[i].
        let zc_of = |z: &Vec<f64>, k: usize| 0.5 * (z[k - 1] + z[k]);
        let mut k_bot = vec![0usize; nx + 1];
        for i in 0..=nx {
            let mut k = 1;
            while k <= nz && zc_of(&z, k) < z_bed[i] {
                k += 1;
            }
            k_bot[i] = k.min(nz);
        }
        let mut kc_bot = vec![0usize; nx + 1];
        for i in 1..=nx {
            kc_bot[i] = k_bot[i - 1].min(k_bot[i]);
        }

        // Clamp width forward above the bed: dry cells (k < k_bot[i]) inherit
        // the width of the shallowest wet node at or above the bed.
        for i in 0..=nx {
            let kb = k_bot[i];
            let wet_width = b[kb * (nx + 1) + i].max(0.0);
            for k in 0..kb {
                let slot = &mut b[k * (nx + 1) + i];
                *slot = (*slot).max(0.0).max(wet_width);
            }
            for k in kb..=nz {
                let slot = &mut b[k * (nx + 1) + i];
                *slot = (*slot).max(0.0);
            }
        }

        let mut dx = vec![0.0; nx + 1];
        for i in 1..=nx {
            dx[i] = x[i] - x[i - 1];
        }
        let mut dz = vec![0.0; nz + 1];
        for k in 1..=nz {
            dz[k] = z[k] - z[k - 1];
        }
        let mut dxs = vec![0.0; nx];
        for i in 1..nx {
            dxs[i] = 0.5 * (dx[i] + dx[i + 1]);
        }
        let mut dzs = vec![0.0; nz];
        for k in 1..nz {
            dzs[k] = 0.5 * (dz[k] + dz[k + 1]);
        }

        let mut mesh = Mesh {
            nx,
            nz,
            x,
            z,
            dx,
            dz,
            dxs,
            dzs,
            b,
            z_bed,
            k_bot,
            kc_bot,
            au: vec![0.0; (nx + 1) * nz],
            aw: vec![0.0; nx * (nz + 1)],
            aus: vec![0.0; (nx + 1) * nz],
            aws: vec![0.0; nx * (nz + 1)],
            vol: vec![0.0; nx * nz],
            vols: vec![0.0; nx * nz],
            dz0: vec![0.0; nz + 1],
            au0: vec![0.0; (nx + 1) * nz],
            aw0: vec![0.0; nx * (nz + 1)],
            aus0: vec![0.0; (nx + 1) * nz],
            aws0: vec![0.0; nx * (nz + 1)],
            vol0: vec![0.0; nx * nz],
            vols0: vec![0.0; nx * nz],
            vol_hgt: vec![0.0; nz + 1],
            area_hgt: vec![0.0; nz + 1],
            len_hgt: vec![0.0; nz + 1],
            z_srf: 0.0,
            k_srf: 0,
            dz_srf: 0.0,
            w_srf: 0.0,
            total_vol: 0.0,
            q_total_vol: 0.0,
        };

        mesh.rebuild_base_tables();
        mesh.dz0 = mesh.dz.clone();
        mesh.au0 = mesh.au.clone();
        mesh.aw0 = mesh.aw.clone();
        mesh.aus0 = mesh.aus.clone();
        mesh.aws0 = mesh.aws.clone();
        mesh.vol0 = mesh.vol.clone();
        mesh.vols0 = mesh.vols.clone();
        mesh.rebuild_height_tables();
        Ok(mesh)
    }

    fn rebuild_base_tables(&mut self) {
        for k in 1..=self.nz {
            for i in 0..=self.nx {
                let area = self.b_at(i, k) * self.dz[k];
                *self.au_at_mut(i, k) = area;
            }
        }
        for k in 0..=self.nz {
            for i in 1..=self.nx {
                let width = 0.5 * (self.b_at(i - 1, k) + self.b_at(i, k));
                *self.aw_at_mut(i, k) = width * self.dx[i];
            }
        }
        for k in 1..=self.nz {
            for i in 1..self.nx {
                let v = self.au_at(i, k) * self.dxs[i];
                self.aus[(k - 1) * self.nx + (i - 1)] = v;
            }
        }
        for k in 0..self.nz {
            for i in 1..=self.nx {
                let v = self.aw_at(i, k.max(1)) * self.dzs[k.max(1).min(self.nz - 1)];
                self.aws[k * self.nx + (i - 1)] = v;
            }
        }
        for k in 1..=self.nz {
            for i in 1..=self.nx {
                *self.vol_at_mut(i, k) = self.b_at(i, k) * self.dx[i] * self.dz[k];
            }
        }
        self.vols.copy_from_slice(&self.vol);
    }

    /// Cumulative volume / area / length tables indexed by elevation `z(k)`
    /// (§4.G): `vol_hgt` is strictly non-decreasing, a monotone bijection on
    /// `[z(0), z(nz)]`, inverted by [`Mesh::z_srf_for_total_vol`].
    fn rebuild_height_tables(&mut self) {
        self.vol_hgt[0] = 0.0;
        self.area_hgt[0] = 0.0;
        for k in 1..=self.nz {
            let mut layer_vol = 0.0;
            let mut layer_area = 0.0;
            for i in 1..=self.nx {
                if self.kc_bot[i] <= k {
                    layer_vol += self.b_at(i, k) * self.dx[i] * self.dz[k];
                    layer_area += self.b_at(i, k) * self.dx[i];
                }
            }
            self.vol_hgt[k] = self.vol_hgt[k - 1] + layer_vol;
            self.area_hgt[k] = layer_area;
        }
        for k in 0..=self.nz {
            self.len_hgt[k] = self.reservoir_length_at(self.z[k]);
        }
    }

    /// Reservoir length wetted at elevation `zq`, by linear interpolation
    /// across the first bed segment the elevation crosses.
    fn reservoir_length_at(&self, zq: f64) -> f64 {
        let mut length = 0.0;
        for i in 1..=self.nx {
            let bed_lo = self.z_bed[i - 1];
            let bed_hi = self.z_bed[i];
            let bed_here = bed_lo.min(bed_hi);
            if zq > bed_here {
                let bed_max = bed_lo.max(bed_hi);
                if zq >= bed_max || (bed_max - bed_here).abs() < 1e-12 {
                    length += self.dx[i];
                } else {
                    length += self.dx[i] * (zq - bed_here) / (bed_max - bed_here);
                }
            }
        }
        length
    }

    /// Invert `vol_hgt` for the free-surface elevation matching `total_vol`.
    pub fn z_srf_for_total_vol(&self, total_vol: f64) -> Result<f64> {
        if total_vol < self.vol_hgt[0] - 1e-9 || total_vol > *self.vol_hgt.last().unwrap() + 1e-9 {
            return Err(StratflowError::config(format!(
                "total_vol={total_vol} outside mesh capacity [{}, {}]",
                self.vol_hgt[0],
                self.vol_hgt.last().unwrap()
            )));
        }
        let mut k = 1;
        while k < self.nz && self.vol_hgt[k] < total_vol {
            k += 1;
        }
        let lo = self.vol_hgt[k - 1];
        let hi = self.vol_hgt[k];
        let frac = if hi > lo { (total_vol - lo) / (hi - lo) } else { 0.0 };
        Ok(self.z[k - 1] + frac * (self.z[k] - self.z[k - 1]))
    }

    pub fn total_vol_for_z_srf(&self, z_srf: f64) -> Result<f64> {
        if z_srf < self.z[0] || z_srf > self.z[self.nz] {
            return Err(StratflowError::config(format!(
                "z_srf={z_srf} outside mesh range [{}, {}]",
                self.z[0], self.z[self.nz]
            )));
        }
        let mut k = 1;
        while k < self.nz && self.z[k] < z_srf {
            k += 1;
        }
        let frac = if self.dz[k] > 0.0 {
            (z_srf - self.z[k - 1]) / self.dz[k]
        } else {
            0.0
        };
        Ok(self.vol_hgt[k - 1] + frac * (self.vol_hgt[k] - self.vol_hgt[k - 1]))
    }

    /// Rebuild only row `k_srf` of the working tables; the rest is restored
    /// from the reference `*0` tables (§4.G second paragraph).
    pub fn update_surface_layer(&mut self, z_srf: f64) -> Result<()> {
        if z_srf > self.z[self.nz] || z_srf <= self.zc(1) {
            return Err(StratflowError::config(format!(
                "surface elevation z_srf={z_srf} out of valid range (zc(1), z(nz)]"
            )));
        }

        self.au.copy_from_slice(&self.au0);
        self.aw.copy_from_slice(&self.aw0);
        self.aus.copy_from_slice(&self.aus0);
        self.aws.copy_from_slice(&self.aws0);
        self.vol.copy_from_slice(&self.vol0);
        self.vols.copy_from_slice(&self.vol0);
        self.dz = self.dz0.clone();

        let mut k_srf = 1;
        while k_srf < self.nz && self.z[k_srf] < z_srf {
            k_srf += 1;
        }
        let dz_srf = z_srf - self.z[k_srf - 1];

        self.dz[k_srf] = dz_srf;

        for i in 0..=self.nx {
            let b_lo = self.b_at(i, k_srf - 1);
            let b_hi = self.b_at(i, k_srf);
            let b_srf = if z_srf <= self.z[k_srf] {
                b_lo + (dz_srf / self.dz0[k_srf]) * (b_hi - b_lo)
            } else {
                b_hi
            };
            *self.b_at_mut(i, k_srf) = b_srf;
        }

        for i in 0..=self.nx {
            *self.au_at_mut(i, k_srf) = self.b_at(i, k_srf) * dz_srf;
        }
        for i in 1..=self.nx {
            *self.vol_at_mut(i, k_srf) = self.b_at(i, k_srf) * self.dx[i] * dz_srf;
            self.vols[(k_srf - 1) * self.nx + (i - 1)] = self.vol_at(i, k_srf);
        }
        for i in 1..self.nx {
            let v = self.au_at(i, k_srf) * self.dxs[i];
            self.aus[(k_srf - 1) * self.nx + (i - 1)] = v;
        }
        for i in 1..=self.nx {
            let width = 0.5 * (self.b_at(i - 1, k_srf) + self.b_at(i, k_srf));
            *self.aw_at_mut(i, k_srf) = width * self.dx[i];
        }

        self.z_srf = z_srf;
        self.k_srf = k_srf;
        self.dz_srf = dz_srf;
        self.total_vol = self.total_vol_for_z_srf(z_srf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_mesh(nx: usize, nz: usize) -> Mesh {
        let x: Vec<f64> = (0..=nx).map(|i| i as f64 * 10.0).collect();
        let z: Vec<f64> = (0..=nz).map(|k| k as f64 * 2.0).collect();
        let b = vec![5.0; (nx + 1) * (nz + 1)];
        let z_bed = vec![0.0; nx + 1];
        Mesh::build(x, z, b, z_bed).unwrap()
    }

    #[test]
    fn vol_hgt_is_monotone_nondecreasing() {
        let mesh = flat_mesh(10, 20);
        for k in 1..=mesh.nz {
            assert!(mesh.vol_hgt[k] >= mesh.vol_hgt[k - 1]);
        }
        assert!(mesh.vol_hgt[mesh.nz] >= mesh.total_vol);
    }

    #[test]
    fn total_vol_roundtrips_through_z_srf() {
        let mesh = flat_mesh(10, 20);
        let z_target = 15.3;
        let v = mesh.total_vol_for_z_srf(z_target).unwrap();
        let z_back = mesh.z_srf_for_total_vol(v).unwrap();
        assert!((z_back - z_target).abs() < 1e-8);
    }

    #[test]
    fn update_surface_layer_is_idempotent() {
        let mut mesh = flat_mesh(10, 20);
        mesh.update_surface_layer(15.3).unwrap();
        let vol_once = mesh.vol.clone();
        let k_once = mesh.k_srf;
        mesh.update_surface_layer(15.3).unwrap();
        assert_eq!(k_once, mesh.k_srf);
        assert_eq!(vol_once, mesh.vol);
    }

    #[test]
    fn update_surface_layer_conserves_column_volume() {
        let mut mesh = flat_mesh(10, 20);
        mesh.update_surface_layer(15.3).unwrap();
        let summed: f64 = (1..=mesh.nx)
            .flat_map(|i| (1..=mesh.k_srf).map(move |k| (i, k)))
            .map(|(i, k)| mesh.vol_at(i, k))
            .sum();
        let eps = 1e-10 * (mesh.nx * mesh.nz) as f64 * mesh.total_vol.max(1.0);
        assert!((summed - mesh.total_vol).abs() <= eps.max(1e-6));
    }

    #[test]
    fn rejects_surface_above_mesh_top() {
        let mesh = flat_mesh(10, 20);
        let mut mesh = mesh;
        assert!(mesh.update_surface_layer(1000.0).is_err());
    }
}
