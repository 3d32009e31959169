//! Forward/backward kernels for the layers of a convolutional network.
//!
//! Every forward kernel returns its output together with a cache of the
//! intermediates its backward kernel needs. Backward kernels take the
//! upstream gradient and that cache and return one gradient per input,
//! each shaped exactly like the corresponding forward input.
//!
//! Kernels are pure functions. The only state that crosses calls is the
//! batchnorm [`RunningStats`], which is passed in and handed back updated.

pub mod error;
pub mod tensor;
pub mod config;
pub mod window;
pub mod affine;
pub mod relu;
pub mod batchnorm;
pub mod spatial_batchnorm;
pub mod dropout;
pub mod conv;
pub mod pool;
pub mod loss;
pub mod gradient;

pub use affine::{affine_backward, affine_forward, AffineCache};
pub use batchnorm::{batchnorm_backward, batchnorm_backward_alt, batchnorm_forward, BatchNormCache};
pub use config::{from_json, BatchNormConfig, ConfigRecord, ConvConfig, DropoutConfig, Mode, PoolConfig, RunningStats};
pub use conv::{conv_backward_naive, conv_forward_naive, ConvCache};
pub use dropout::{dropout_backward, dropout_forward, DropoutCache};
pub use error::{KernelError, Result};
pub use loss::{softmax_loss, svm_loss};
pub use pool::{max_pool_backward_naive, max_pool_forward_naive, PoolCache};
pub use relu::{relu_backward, relu_forward, ReluCache};
pub use spatial_batchnorm::{spatial_batchnorm_backward, spatial_batchnorm_forward, SpatialBatchNormCache};
pub use tensor::Tensor;
