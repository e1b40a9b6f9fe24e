//! GANomaly trainer core: input binding, the two optimization steps,
//! discriminator re-initialization, loss snapshots and weight I/O.
//!
//! One optimization step runs in a fixed order:
//!
//! ```text
//! update_discriminator   D(x) vs 1, D(G(x).detach()) vs 0, step D
//! update_generator       D(G(x)) vs 1 + alpha·|G(x) - x| + |z - z'|², step G
//! collapse check         re-initialize D if either D loss < 1e-5
//! ```
//!
//! The generator output from `update_discriminator` is kept, still attached
//! to the generator's graph, and consumed by `update_generator`. The
//! generator step therefore scores that output against the freshly updated
//! discriminator.

use std::path::PathBuf;

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::config::GanomalyConfig;
use crate::data::Batch;
use crate::error::{GanomalyError, Result};
use crate::evaluation::EvaluatorState;
use crate::model::bridge::tensor_to_f64;
use crate::model::{Discriminator, Generator, GeneratorOutput};
use crate::training::checkpoint;
use crate::training::loss::{bce_loss, l1_loss, l2_loss};
use crate::training::metrics::LossSnapshot;
use crate::visualizer::{NullVisualizer, Visualizer};

/// Target for the discriminator on real inputs.
pub const REAL_LABEL: f32 = 1.0;
/// Target for the discriminator on reconstructions.
pub const FAKE_LABEL: f32 = 0.0;
/// Discriminator losses below this mean D has collapsed.
pub const COLLAPSE_THRESHOLD: f64 = 1e-5;

/// Whether the discriminator must be re-initialized after a step.
pub fn should_reinitialize(err_d_real: f64, err_d_fake: f64) -> bool {
    err_d_real < COLLAPSE_THRESHOLD || err_d_fake < COLLAPSE_THRESHOLD
}

/// Builds a fresh optimizer from the run options.
type OptimizerFactory<O> = Box<dyn Fn(&GanomalyConfig) -> O>;

/// Buffers reused across steps.
struct TrainerState<B: Backend> {
    input: Option<Tensor<B, 4>>,
    gt: Vec<i64>,
    fixed_input: Option<Tensor<B, 4>>,
    /// Output of the last D update, still attached to G's graph.
    pending: Option<GeneratorOutput<B>>,
    /// Detached reconstruction of the last completed step.
    last_fake: Option<Tensor<B, 4>>,
}

/// Current inputs and reconstructions for display.
#[derive(Debug, Clone)]
pub struct CurrentImages<B: Backend> {
    pub reals: Tensor<B, 4>,
    pub fakes: Tensor<B, 4>,
    pub fixed: Tensor<B, 4>,
}

/// GANomaly model with its optimizers and training state.
///
/// `OG` and `OD` are the generator and discriminator optimizers. Use
/// [`with_adam`] for the standard setup.
pub struct Ganomaly<B: AutodiffBackend, OG, OD> {
    pub(crate) config: GanomalyConfig,
    pub(crate) device: B::Device,
    pub(crate) netg: Generator<B>,
    pub(crate) netd: Discriminator<B>,
    optimizer_g: OG,
    optimizer_d: OD,
    fresh_optimizer_d: OptimizerFactory<OD>,
    state: TrainerState<B>,
    losses: LossSnapshot,
    /// Samples seen since the last reset; advanced by `batch_size` per batch.
    pub(crate) total_steps: usize,
    pub(crate) epoch: usize,
    pub(crate) discriminator_resets: usize,
    pub(crate) visualizer: Box<dyn Visualizer>,
    pub(crate) evaluation: Option<EvaluatorState>,
}

/// Build a model with Adam optimizers for both networks
/// (`lr` and `beta1` from the options, beta2 = 0.999).
#[allow(clippy::type_complexity)]
pub fn with_adam<B: AutodiffBackend>(
    config: GanomalyConfig,
    device: &B::Device,
) -> Result<Ganomaly<B, impl Optimizer<Generator<B>, B>, impl Optimizer<Discriminator<B>, B>>> {
    Ganomaly::new(
        config,
        device,
        |c: &GanomalyConfig| c.optimizer().init(),
        |c: &GanomalyConfig| c.optimizer().init(),
    )
}

impl<B, OG, OD> Ganomaly<B, OG, OD>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    /// Build both networks and their optimizers.
    ///
    /// If `config.resume` names a weights directory, both networks are loaded
    /// from it and `config.iter` is set to the stored epoch.
    pub fn new<FG, FD>(
        config: GanomalyConfig,
        device: &B::Device,
        make_optimizer_g: FG,
        make_optimizer_d: FD,
    ) -> Result<Self>
    where
        FG: Fn(&GanomalyConfig) -> OG,
        FD: Fn(&GanomalyConfig) -> OD + 'static,
    {
        config.validate()?;
        let mut config = config;
        let mut netg = config.network.init_generator::<B>(device);
        let mut netd = config.network.init_discriminator::<B>(device);

        if let Some(resume) = config.resume.clone() {
            let dir = PathBuf::from(resume);
            tracing::info!(dir = %dir.display(), "Loading pre-trained networks");
            let (g, meta) = checkpoint::load_generator(&dir, netg, device)?;
            let (d, _) = checkpoint::load_discriminator(&dir, netd, device)?;
            netg = g;
            netd = d;
            config.iter = meta.epoch;
            tracing::info!(epoch = meta.epoch, "Resuming from checkpoint");
        }

        Ok(Self {
            optimizer_g: make_optimizer_g(&config),
            optimizer_d: make_optimizer_d(&config),
            fresh_optimizer_d: Box::new(make_optimizer_d),
            device: device.clone(),
            netg,
            netd,
            state: TrainerState {
                input: None,
                gt: Vec::with_capacity(config.batch_size),
                fixed_input: None,
                pending: None,
                last_fake: None,
            },
            losses: LossSnapshot::default(),
            total_steps: 0,
            epoch: 0,
            discriminator_resets: 0,
            visualizer: Box::new(NullVisualizer),
            evaluation: None,
            config,
        })
    }

    /// Replace the sink that receives losses, images and performance.
    pub fn with_visualizer(mut self, visualizer: Box<dyn Visualizer>) -> Self {
        self.visualizer = visualizer;
        self
    }

    pub fn config(&self) -> &GanomalyConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn generator(&self) -> &Generator<B> {
        &self.netg
    }

    pub fn discriminator(&self) -> &Discriminator<B> {
        &self.netd
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Number of discriminator re-initializations so far.
    pub fn discriminator_resets(&self) -> usize {
        self.discriminator_resets
    }

    /// Labels of the currently bound batch.
    pub fn ground_truth(&self) -> &[i64] {
        &self.state.gt
    }

    /// Score tables from the latest evaluation pass.
    pub fn evaluation(&self) -> Option<&EvaluatorState> {
        self.evaluation.as_ref()
    }

    /// Bind a batch as the current input.
    ///
    /// The batch may be smaller than `batch_size` but not larger, and must
    /// match `(nc, isize, isize)`. The first batch of a run (when
    /// `total_steps == batch_size`) is also cached as the fixed input;
    /// no other batch is.
    pub fn set_input(&mut self, batch: &Batch<B>) -> Result<()> {
        let dims = batch.images.dims();
        let [nc, h, w] = self.config.network.image_dims();
        let batch_size = self.config.batch_size;
        if dims[0] == 0 || dims[0] > batch_size || dims[1..] != [nc, h, w] {
            return Err(GanomalyError::shape([batch_size, nc, h, w], dims));
        }
        if batch.labels.len() != dims[0] {
            return Err(GanomalyError::shape(dims[0], batch.labels.len()));
        }

        self.state.input = Some(batch.images.clone());
        self.state.gt.clear();
        self.state.gt.extend_from_slice(&batch.labels);

        if self.total_steps == batch_size {
            self.state.fixed_input = Some(batch.images.clone());
        }
        Ok(())
    }

    fn input(&self) -> Result<Tensor<B, 4>> {
        self.state
            .input
            .clone()
            .ok_or(GanomalyError::NotReady("no input bound; call set_input first"))
    }

    fn labels(&self, value: f32, batch: usize) -> Tensor<B, 1> {
        Tensor::full([batch], value, &self.device)
    }

    /// One discriminator step on the bound input.
    ///
    /// Runs the generator once and keeps its output for
    /// [`update_generator`](Self::update_generator).
    pub fn update_discriminator(&mut self) -> Result<()> {
        let input = self.input()?;
        let batch = input.dims()[0];

        let (out_real, _) = self.netd.forward(input.clone());
        let err_d_real = bce_loss(out_real, self.labels(REAL_LABEL, batch));

        let output = self.netg.forward(input);
        let (out_fake, _) = self.netd.forward(output.reconstruction.clone().detach());
        let err_d_fake = bce_loss(out_fake, self.labels(FAKE_LABEL, batch));

        let real_val = tensor_to_f64(err_d_real.clone());
        let fake_val = tensor_to_f64(err_d_fake.clone());

        let err_d = err_d_real + err_d_fake;
        let grads = GradientsParams::from_grads(err_d.backward(), &self.netd);
        self.netd = self.optimizer_d.step(self.config.lr, self.netd.clone(), grads);

        self.losses.err_d_real = real_val;
        self.losses.err_d_fake = fake_val;
        self.losses.err_d = real_val + fake_val;
        self.state.pending = Some(output);
        Ok(())
    }

    /// One generator step using the output kept by the last D update.
    pub fn update_generator(&mut self) -> Result<()> {
        let output = self.state.pending.take().ok_or(GanomalyError::NotReady(
            "update_generator needs the output of update_discriminator",
        ))?;
        let input = self.input()?;
        let batch = input.dims()[0];
        let alpha = self.config.alpha;

        let (out_g, _) = self.netd.forward(output.reconstruction.clone());
        let err_g_bce = bce_loss(out_g, self.labels(REAL_LABEL, batch));
        let err_g_l1l = l1_loss(output.reconstruction.clone(), input);
        let err_g_enc = l2_loss(output.latent_o, output.latent_i);

        let bce_val = tensor_to_f64(err_g_bce.clone());
        let l1l_val = tensor_to_f64(err_g_l1l.clone());
        let enc_val = tensor_to_f64(err_g_enc.clone());

        let err_g = err_g_bce + err_g_l1l.mul_scalar(alpha) + err_g_enc;
        let grads = GradientsParams::from_grads(err_g.backward(), &self.netg);
        self.netg = self.optimizer_g.step(self.config.lr, self.netg.clone(), grads);

        self.losses.err_g_bce = bce_val;
        self.losses.err_g_l1l = l1l_val;
        self.losses.err_g_enc = enc_val;
        self.losses.err_g = bce_val + alpha * l1l_val + enc_val;
        self.state.last_fake = Some(output.reconstruction.detach());
        Ok(())
    }

    /// Replace the discriminator with fresh weights and a fresh optimizer.
    pub fn reinitialize_discriminator(&mut self) {
        self.netd = self.config.network.init_discriminator::<B>(&self.device);
        self.optimizer_d = (self.fresh_optimizer_d)(&self.config);
        self.discriminator_resets += 1;
    }

    /// Full step: D update, G update, then the collapse check.
    ///
    /// Returns `true` if the discriminator was re-initialized.
    pub fn optimize(&mut self) -> Result<bool> {
        self.update_discriminator()?;
        self.update_generator()?;

        if should_reinitialize(self.losses.err_d_real, self.losses.err_d_fake) {
            tracing::warn!(
                err_d_real = self.losses.err_d_real,
                err_d_fake = self.losses.err_d_fake,
                "Reloading net d"
            );
            self.reinitialize_discriminator();
            return Ok(true);
        }
        Ok(false)
    }

    /// Loss values from the most recent step.
    pub fn get_errors(&self) -> LossSnapshot {
        self.losses
    }

    /// Current input, its reconstruction, and the reconstruction of the
    /// fixed input, all detached from the graph.
    ///
    /// The fixed input is passed through the generator in inference mode, so
    /// this does not touch batch-norm running statistics.
    pub fn get_current_images(&self) -> Result<CurrentImages<B::InnerBackend>> {
        let reals = self.input()?.inner();
        let fakes = self
            .state
            .last_fake
            .clone()
            .ok_or(GanomalyError::NotReady("no reconstruction yet; run optimize first"))?
            .inner();
        let fixed_input = self
            .state
            .fixed_input
            .clone()
            .ok_or(GanomalyError::NotReady("no fixed input cached"))?;
        let fixed = self.netg.valid().forward(fixed_input.inner()).reconstruction;

        Ok(CurrentImages {
            reals,
            fakes,
            fixed,
        })
    }

    /// Save both networks to `<outf>/<name>/train/weights` after `epoch`.
    pub fn save_weights(&self, epoch: usize) -> Result<()> {
        checkpoint::save_weights(&self.config.weights_dir(), epoch, &self.netg, &self.netd)
    }

    /// Load generator weights from `<outf>/<name>/train/weights`.
    pub fn load_generator_weights(&mut self) -> Result<()> {
        let dir = self.config.weights_dir();
        let (netg, meta) = checkpoint::load_generator(&dir, self.netg.clone(), &self.device)?;
        self.netg = netg;
        tracing::info!(dir = %dir.display(), epoch = meta.epoch, "Loaded generator weights");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::module::{ModuleMapper, ModuleVisitor, ParamId};
    use burn::tensor::Distribution;
    use tempfile::TempDir;

    use crate::model::NetworkConfig;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn tiny_config(outf: &str) -> GanomalyConfig {
        GanomalyConfig::new(
            NetworkConfig::new()
                .with_isize(16)
                .with_nc(1)
                .with_nz(4)
                .with_ngf(4)
                .with_ndf(4),
        )
        .with_batch_size(4)
        .with_outf(outf.to_string())
        .with_name("unit".to_string())
    }

    fn batch(n: usize) -> Batch<TestBackend> {
        let device = Default::default();
        Batch {
            images: Tensor::random([n, 1, 16, 16], Distribution::Uniform(-1.0, 1.0), &device),
            labels: (0..n as i64).map(|i| i % 2).collect(),
        }
    }

    #[test]
    fn test_should_reinitialize() {
        assert!(should_reinitialize(1e-6, 0.5));
        assert!(should_reinitialize(0.5, 1e-6));
        assert!(!should_reinitialize(1e-5, 1e-5));
        assert!(!should_reinitialize(0.7, 0.7));
    }

    #[test]
    fn test_set_input_rejects_wrong_geometry() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let mut model =
            with_adam::<TestBackend>(tiny_config(tmp.path().to_str().unwrap()), &device)
                .unwrap();

        let wrong = Batch::<TestBackend> {
            images: Tensor::zeros([2, 3, 16, 16], &device),
            labels: vec![0, 0],
        };
        assert!(matches!(
            model.set_input(&wrong),
            Err(GanomalyError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            model.set_input(&batch(5)),
            Err(GanomalyError::ShapeMismatch { .. })
        ));

        model.set_input(&batch(3)).unwrap();
        assert_eq!(model.ground_truth(), &[0, 1, 0]);
    }

    #[test]
    fn test_update_generator_requires_discriminator_step() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let mut model =
            with_adam::<TestBackend>(tiny_config(tmp.path().to_str().unwrap()), &device)
                .unwrap();
        model.set_input(&batch(4)).unwrap();
        assert!(matches!(model.update_generator(), Err(GanomalyError::NotReady(_))));
    }

    #[test]
    fn test_optimize_loss_identities() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let config = tiny_config(tmp.path().to_str().unwrap()).with_alpha(10.0);
        let mut model = with_adam::<TestBackend>(config, &device).unwrap();

        model.set_input(&batch(4)).unwrap();
        model.optimize().unwrap();
        let e = model.get_errors();

        assert_eq!(e.err_d, e.err_d_real + e.err_d_fake);
        assert_eq!(e.err_g, e.err_g_bce + 10.0 * e.err_g_l1l + e.err_g_enc);
        for (name, value) in e.entries() {
            assert!(value.is_finite(), "{name} = {value}");
            assert!(value >= 0.0, "{name} = {value}");
        }
    }

    #[test]
    fn test_optimize_changes_both_networks() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let mut model =
            with_adam::<TestBackend>(tiny_config(tmp.path().to_str().unwrap()), &device)
                .unwrap();
        let inputs = batch(2).images.inner();

        let g_before: Vec<f32> = model.generator().valid().forward(inputs.clone()).latent_i
            .into_data().to_vec().unwrap();
        let d_before: Vec<f32> = model.discriminator().valid().forward(inputs.clone()).0
            .into_data().to_vec().unwrap();

        model.set_input(&batch(4)).unwrap();
        model.optimize().unwrap();

        let g_after: Vec<f32> = model.generator().valid().forward(inputs.clone()).latent_i
            .into_data().to_vec().unwrap();
        assert_ne!(g_before, g_after);
        if model.discriminator_resets() == 0 {
            let d_after: Vec<f32> = model.discriminator().valid().forward(inputs).0
                .into_data().to_vec().unwrap();
            assert_ne!(d_before, d_after);
        }
    }

    #[test]
    fn test_reinitialize_replaces_discriminator() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let mut model =
            with_adam::<TestBackend>(tiny_config(tmp.path().to_str().unwrap()), &device)
                .unwrap();
        let inputs = batch(2).images.inner();
        let before: Vec<f32> = model.discriminator().valid().forward(inputs.clone()).0
            .into_data().to_vec().unwrap();

        model.reinitialize_discriminator();
        let after: Vec<f32> = model.discriminator().valid().forward(inputs).0
            .into_data().to_vec().unwrap();
        assert_eq!(model.discriminator_resets(), 1);
        assert_ne!(before, after);

        // Training continues normally with the fresh D and optimizer.
        model.set_input(&batch(4)).unwrap();
        model.optimize().unwrap();
    }

    /// Zeroes every conv kernel except the classifier and sets all 1-D
    /// parameters to 1, so D outputs probability 1 for any input.
    struct SaturateDiscriminator {
        kernels: usize,
        seen: usize,
    }

    impl ModuleVisitor<TestBackend> for SaturateDiscriminator {
        fn visit_float<const D: usize>(&mut self, _id: ParamId, _tensor: &Tensor<TestBackend, D>) {
            if D == 4 {
                self.kernels += 1;
            }
        }
    }

    impl ModuleMapper<TestBackend> for SaturateDiscriminator {
        fn map_float<const D: usize>(
            &mut self,
            _id: ParamId,
            tensor: Tensor<TestBackend, D>,
        ) -> Tensor<TestBackend, D> {
            let shape = tensor.shape();
            let device = tensor.device();
            let value = if D == 4 {
                self.seen += 1;
                if self.seen == self.kernels { 1.0 } else { 0.0 }
            } else {
                1.0
            };
            Tensor::<TestBackend, D>::full(shape, value, &device).require_grad()
        }
    }

    #[test]
    fn test_optimize_reinitializes_collapsed_discriminator() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let mut model =
            with_adam::<TestBackend>(tiny_config(tmp.path().to_str().unwrap()), &device)
                .unwrap();

        let mut saturate = SaturateDiscriminator { kernels: 0, seen: 0 };
        model.netd.visit(&mut saturate);
        model.netd = model.netd.clone().map(&mut saturate);

        let inputs = batch(4);
        let saturated: Vec<f32> = model.discriminator().forward(inputs.images.clone()).0
            .into_data().to_vec().unwrap();
        assert!(saturated.iter().all(|&p| p == 1.0), "{saturated:?}");

        model.set_input(&inputs).unwrap();
        assert!(model.optimize().unwrap());
        assert!(model.get_errors().err_d_real < COLLAPSE_THRESHOLD);
        assert_eq!(model.discriminator_resets(), 1);

        let fresh: Vec<f32> = model.discriminator().valid().forward(inputs.images.inner()).0
            .into_data().to_vec().unwrap();
        assert!(fresh.iter().all(|&p| p < 1.0), "{fresh:?}");

        // A healthy step afterwards does not reset again.
        model.set_input(&batch(4)).unwrap();
        assert!(!model.optimize().unwrap());
        assert_eq!(model.discriminator_resets(), 1);
    }

    #[test]
    fn test_fixed_input_cached_only_on_first_batch() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let mut model =
            with_adam::<TestBackend>(tiny_config(tmp.path().to_str().unwrap()), &device)
                .unwrap();

        // total_steps is 0, not batch_size: nothing is cached.
        model.set_input(&batch(4)).unwrap();
        model.optimize().unwrap();
        assert!(matches!(
            model.get_current_images(),
            Err(GanomalyError::NotReady(_))
        ));

        model.total_steps = 4;
        model.set_input(&batch(4)).unwrap();
        model.optimize().unwrap();
        assert!(model.get_current_images().is_ok());
    }

    #[test]
    fn test_current_images_shapes() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let mut model =
            with_adam::<TestBackend>(tiny_config(tmp.path().to_str().unwrap()), &device)
                .unwrap();
        assert!(model.get_current_images().is_err());

        model.total_steps = 4;
        let input = batch(4);
        model.set_input(&input).unwrap();
        model.optimize().unwrap();
        let images = model.get_current_images().unwrap();
        assert_eq!(images.reals.dims(), [4, 1, 16, 16]);
        images
            .reals
            .clone()
            .into_data()
            .assert_eq(&input.images.inner().into_data(), true);
        assert_eq!(images.fakes.dims(), [4, 1, 16, 16]);
        assert_eq!(images.fixed.dims(), [4, 1, 16, 16]);
    }

    #[test]
    fn test_save_then_resume() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let config = tiny_config(tmp.path().to_str().unwrap());
        let model = with_adam::<TestBackend>(config.clone(), &device).unwrap();
        model.save_weights(4).unwrap();

        let weights = config.weights_dir();
        assert!(weights.join("netG.mpk").exists());
        assert!(weights.join("netD.mpk").exists());

        let resumed = with_adam::<TestBackend>(
            config.with_resume(Some(weights.to_string_lossy().into_owned())),
            &device,
        )
        .unwrap();
        assert_eq!(resumed.config().iter, 5);
    }

    #[test]
    fn test_load_generator_weights_missing() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let mut model =
            with_adam::<TestBackend>(tiny_config(tmp.path().to_str().unwrap()), &device)
                .unwrap();
        assert!(matches!(
            model.load_generator_weights(),
            Err(GanomalyError::WeightsNotFound(_))
        ));
    }
}
