//! Geometric multigrid solver for `-lap(phi) / 4pi = rho`.

use control::{RelaxMethod, StencilOrder};
use gpcomm::Communicator;
use gpconsts::*;
use gpgrid::Array3;
use griddesc::{GridDescriptor, GridError};
use stencil::{Stencil, StencilError};
use thiserror::Error;
use tracing::{debug, warn};
use transformer::{Transformer, TransformerError};

mod gauss;
pub use gauss::Gaussian;

#[derive(Error, Debug)]
pub enum PoissonError {
    #[error("Poisson solver did not converge after {iterations} iterations (charge = {charge:.6e}, error = {error:.6e})")]
    Convergence {
        iterations: usize,
        charge: f64,
        error: f64,
    },

    #[error("unsupported relaxation method '{0}'")]
    UnsupportedRelaxation(String),

    #[error("unsupported stencil '{0}'")]
    UnsupportedStencil(String),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Stencil(#[from] StencilError),

    #[error(transparent)]
    Transformer(#[from] TransformerError),
}

pub type PoissonResult<T> = Result<T, PoissonError>;

/// `GS` or `J`.
pub fn relax_method_from_name(name: &str) -> PoissonResult<RelaxMethod> {
    match name {
        "GS" => Ok(RelaxMethod::GaussSeidel),
        "J" => Ok(RelaxMethod::Jacobi),
        _ => Err(PoissonError::UnsupportedRelaxation(name.to_string())),
    }
}

/// `1`, `2`, `3` or `M`.
pub fn stencil_order_from_name(name: &str) -> PoissonResult<StencilOrder> {
    match name {
        "M" => Ok(StencilOrder::Mehrstellen),
        "1" => Ok(StencilOrder::Laplace(1)),
        "2" => Ok(StencilOrder::Laplace(2)),
        "3" => Ok(StencilOrder::Laplace(3)),
        _ => Err(PoissonError::UnsupportedStencil(name.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultigridCycle {
    /// smoothing on every level
    VCycle,
    /// one coarse-grid correction and one damped residual step per level
    Richardson,
}

#[derive(Debug)]
struct Level {
    gd: GridDescriptor,
    operator: Stencil,
    rho: Array3<f64>,
    phi: Array3<f64>,
    residual: Array3<f64>,
    presmooths: usize,
    postsmooths: usize,
    weight: f64,
    step: f64,
    // to and from the next coarser level
    restrictor: Option<Transformer>,
    interpolator: Option<Transformer>,
}

#[derive(Debug)]
pub struct PoissonSolver {
    gd: GridDescriptor,
    levels: Vec<Level>,
    b: Option<Stencil>,
    relax: RelaxMethod,
    cycle: MultigridCycle,
    gauss: Option<Gaussian>,
}

impl PoissonSolver {
    pub fn new(
        gd: &GridDescriptor,
        order: StencilOrder,
        relax: RelaxMethod,
        load_gauss: bool,
        comm: &dyn Communicator,
    ) -> PoissonResult<PoissonSolver> {
        let scale = -0.25 / PI;

        let (operator, b) = match order {
            StencilOrder::Laplace(nn) => (Stencil::laplace(gd, scale, nn)?, None),
            StencilOrder::Mehrstellen => (
                Stencil::mehrstellen_a(gd, -scale),
                Some(Stencil::mehrstellen_b(gd)),
            ),
        };

        let step0 = 0.66666666 / operator.get_diagonal_element();

        let mut levels = vec![Level {
            gd: gd.clone(),
            operator,
            rho: gd.zeros(),
            phi: gd.zeros(),
            residual: gd.zeros(),
            presmooths: 2,
            postsmooths: 1,
            weight: 2.0 / 3.0,
            step: step0,
            restrictor: None,
            interpolator: None,
        }];

        let mut gd_fine = gd.clone();

        while levels.len() <= POISSON_MAX_EXTRA_LEVELS {
            let gd_coarse = match gd_fine.coarsen() {
                Ok(g) => g,
                Err(e) => {
                    debug!("multigrid coarsening stops: {}", e);
                    break;
                }
            };

            let step = 4.0 * levels[levels.len() - 1].step;

            if let Some(fine) = levels.last_mut() {
                fine.restrictor = Some(Transformer::new(&gd_fine, &gd_coarse, 1)?);
                fine.interpolator = Some(Transformer::new(&gd_coarse, &gd_fine, 1)?);
            }

            levels.push(Level {
                operator: Stencil::laplace(&gd_coarse, scale, 1)?,
                rho: gd_coarse.zeros(),
                phi: gd_coarse.zeros(),
                residual: gd_coarse.zeros(),
                presmooths: 4,
                postsmooths: 4,
                weight: 1.0,
                step,
                restrictor: None,
                interpolator: None,
                gd: gd_coarse.clone(),
            });

            gd_fine = gd_coarse;
        }

        if let Some(coarsest) = levels.last_mut() {
            coarsest.presmooths = 8;
            coarsest.postsmooths = 8;
        }

        debug!(
            nlevels = levels.len(),
            coarsest = ?gd_fine.get_n_c(),
            "multigrid levels"
        );

        let gauss = if load_gauss {
            Some(Gaussian::new(gd, comm))
        } else {
            None
        };

        Ok(PoissonSolver {
            gd: gd.clone(),
            levels,
            b,
            relax,
            cycle: MultigridCycle::VCycle,
            gauss,
        })
    }

    pub fn from_names(
        gd: &GridDescriptor,
        nn: &str,
        relax: &str,
        load_gauss: bool,
        comm: &dyn Communicator,
    ) -> PoissonResult<PoissonSolver> {
        let order = stencil_order_from_name(nn)?;
        let relax = relax_method_from_name(relax)?;

        PoissonSolver::new(gd, order, relax, load_gauss, comm)
    }

    pub fn set_cycle(&mut self, cycle: MultigridCycle) {
        self.cycle = cycle;
    }

    pub fn get_nlevels(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level_n_c(&self, level: usize) -> [usize; 3] {
        self.levels[level].gd.get_n_c()
    }

    pub fn get_step(&self) -> f64 {
        self.levels[0].step
    }

    pub fn get_gd(&self) -> &GridDescriptor {
        &self.gd
    }

    pub fn is_gauss_loaded(&self) -> bool {
        self.gauss.is_some()
    }

    /// Solve for `phi` in place, starting from its current content.
    ///
    /// `charge = None` means the charge is the integral of `rho`. Densities
    /// with more than `maxcharge` net charge are neutralized with a unit
    /// gaussian whose analytic potential is added back afterwards.
    pub fn solve(
        &mut self,
        phi: &mut Array3<f64>,
        rho: &Array3<f64>,
        eps: f64,
        charge: Option<f64>,
        maxcharge: f64,
        comm: &dyn Communicator,
    ) -> PoissonResult<usize> {
        self.gd.check_shape(phi);
        self.gd.check_shape(rho);

        let charge = match charge {
            Some(q) => q,
            None => self.gd.integrate(rho, comm),
        };

        if charge.abs() <= maxcharge {
            return self.solve_neutral(phi, rho, eps, comm);
        }

        if self.gauss.is_none() {
            self.gauss = Some(Gaussian::new(&self.gd, comm));
        }

        let mut rho_neutral = rho.clone();

        if let Some(g) = self.gauss.as_ref() {
            rho_neutral.axpy(-charge, g.get_gauss());
            phi.axpy(-charge, g.get_gauss_pot());
        }

        let niter = self.solve_neutral(phi, &rho_neutral, eps, comm)?;

        if let Some(g) = self.gauss.as_ref() {
            phi.axpy(charge, g.get_gauss_pot());
        }

        Ok(niter)
    }

    /// `solve` with the default tolerance, charge from `rho` and default
    /// excess-charge threshold.
    pub fn solve_default(
        &mut self,
        phi: &mut Array3<f64>,
        rho: &Array3<f64>,
        comm: &dyn Communicator,
    ) -> PoissonResult<usize> {
        self.solve(
            phi,
            rho,
            POISSON_DEFAULT_EPS,
            None,
            POISSON_DEFAULT_MAXCHARGE,
            comm,
        )
    }

    fn solve_neutral(
        &mut self,
        phi: &mut Array3<f64>,
        rho: &Array3<f64>,
        eps: f64,
        comm: &dyn Communicator,
    ) -> PoissonResult<usize> {
        {
            let top = &mut self.levels[0];
            top.phi.assign(phi);
            match self.b.as_mut() {
                Some(b) => b.apply(rho, &mut top.rho),
                None => top.rho.assign(rho),
            }
        }

        let mut niter = 1;
        let mut error = self.cycle_once(comm);

        while error > eps && niter < POISSON_MAX_ITER {
            error = self.cycle_once(comm);
            niter += 1;
        }

        phi.assign(&self.levels[0].phi);

        if error > eps {
            let charge = self.gd.integrate(rho, comm);
            warn!(charge, error, "Poisson solver did not converge");

            return Err(PoissonError::Convergence {
                iterations: niter,
                charge,
                error,
            });
        }

        debug!(niter, error, "Poisson solver converged");

        Ok(niter)
    }

    fn cycle_once(&mut self, comm: &dyn Communicator) -> f64 {
        match self.cycle {
            MultigridCycle::VCycle => self.iterate2(comm),
            MultigridCycle::Richardson => self.iterate(0, comm),
        }
    }

    fn pair(&mut self, level: usize) -> (&mut Level, &mut Level) {
        let (fine, coarse) = self.levels.split_at_mut(level + 1);
        (&mut fine[level], &mut coarse[0])
    }

    // residual = L phi - rho on the given level
    fn compute_residual(lv: &mut Level) {
        lv.operator.apply(&lv.phi, &mut lv.residual);
        lv.residual.substract(&lv.rho);
    }

    /// One V-cycle; returns `sum(r^2) dv` on the finest level.
    fn iterate2(&mut self, comm: &dyn Communicator) -> f64 {
        let method = self.relax;
        let coarsest = self.levels.len() - 1;

        for level in 0..coarsest {
            let (fine, coarse) = self.pair(level);

            fine.operator
                .relax(method, &mut fine.phi, &fine.rho, fine.presmooths, fine.weight);

            PoissonSolver::compute_residual(fine);

            if let Some(r) = fine.restrictor.as_mut() {
                r.apply(&fine.residual, &mut coarse.rho);
            }
            coarse.phi.set_value(0.0);
        }

        {
            let lv = &mut self.levels[coarsest];
            lv.operator
                .relax(method, &mut lv.phi, &lv.rho, lv.postsmooths, lv.weight);
        }

        for level in (0..coarsest).rev() {
            let (fine, coarse) = self.pair(level);

            if let Some(p) = fine.interpolator.as_mut() {
                p.apply(&coarse.phi, &mut fine.residual);
            }
            fine.phi.substract(&fine.residual);

            fine.operator
                .relax(method, &mut fine.phi, &fine.rho, fine.postsmooths, fine.weight);
        }

        let top = &mut self.levels[0];
        PoissonSolver::compute_residual(top);

        comm.sum_scalar(top.residual.dot(&top.residual)) * top.gd.get_dv()
    }

    /// Richardson cycle: the first pass on each level applies the coarse-grid
    /// correction, the second a residual step of size `step`.
    fn iterate(&mut self, level: usize, comm: &dyn Communicator) -> f64 {
        let coarsest = self.levels.len() - 1;

        let mut error = 0.0;

        for pass in 1..=2 {
            {
                let lv = &mut self.levels[level];
                if level > 0 && pass == 1 {
                    lv.residual.assign(&lv.rho);
                    lv.residual.scale(-1.0);
                } else {
                    PoissonSolver::compute_residual(lv);
                }
                error = comm.sum_scalar(lv.residual.dot(&lv.residual)) * lv.gd.get_dv();
            }

            if pass == 1 && level < coarsest {
                {
                    let (fine, coarse) = self.pair(level);
                    if let Some(r) = fine.restrictor.as_mut() {
                        r.apply(&fine.residual, &mut coarse.rho);
                    }
                    coarse.phi.set_value(0.0);
                }

                self.iterate(level + 1, comm);

                let (fine, coarse) = self.pair(level);
                if let Some(p) = fine.interpolator.as_mut() {
                    p.apply(&coarse.phi, &mut fine.residual);
                }
                fine.phi.substract(&fine.residual);
                continue;
            }

            let lv = &mut self.levels[level];
            let step = lv.step;
            lv.phi.axpy(-step, &lv.residual);
        }

        error
    }
}
