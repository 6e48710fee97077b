//! Candle-based ResNet-50 feature extractor.
//!
//! The classification head is dropped, leaving the 2048-dimensional
//! pooled features that feed the vector index.

use candle_core::{DType, Device, Tensor};
use candle_nn::{Func, Module, VarBuilder};
use candle_transformers::models::resnet;
use image::imageops::FilterType;
use tracing::{debug, info};

use crate::cache::{get_or_download_model, ModelCache};
use crate::error::EmbeddingError;
use crate::model::{Embedding, FeatureExtractor, ModelInfo, RESNET50_DIM};

/// Model input resolution
pub const INPUT_SIZE: usize = 224;

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Default batch size for feature extraction
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// ResNet-50 feature extractor.
pub struct ResnetExtractor {
    model: Func<'static>,
    device: Device,
    info: ModelInfo,
}

impl ResnetExtractor {
    /// Load the model from cache (downloading weights if needed).
    pub fn load(cache: &ModelCache) -> Result<Self, EmbeddingError> {
        let paths = get_or_download_model(cache)?;
        Self::load_from_weights(&paths.weights)
    }

    /// Load with default cache settings
    pub fn load_default() -> Result<Self, EmbeddingError> {
        let cache = ModelCache::default();
        Self::load(&cache)
    }

    /// Load from an explicit safetensors file
    pub fn load_from_weights(weights_path: &std::path::Path) -> Result<Self, EmbeddingError> {
        info!("Loading feature extraction model...");

        // Use CPU device (GPU support can be added later with feature flags)
        let device = Device::Cpu;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.to_path_buf()], DType::F32, &device)?
        };

        let model = resnet::resnet50_no_final_layer(vb)?;

        info!(
            dim = RESNET50_DIM,
            input = INPUT_SIZE,
            "Model loaded successfully"
        );

        Ok(Self {
            model,
            device,
            info: ModelInfo {
                name: "resnet50".to_string(),
                dimension: RESNET50_DIM,
                input_resolution: INPUT_SIZE,
            },
        })
    }

    /// Validate the raw feature vector and normalize it.
    fn features_to_embedding(&self, features: Vec<f32>) -> Result<Embedding, EmbeddingError> {
        if features.len() != self.info.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.info.dimension,
                actual: features.len(),
            });
        }

        let norm: f32 = features.iter().map(|x| x * x).sum::<f32>().sqrt();
        if !norm.is_finite() || norm <= 0.0 {
            return Err(EmbeddingError::InvalidInput(
                "feature vector has no usable norm".to_string(),
            ));
        }

        Ok(Embedding::new(features))
    }
}

/// Decode image bytes into a normalized (3, 224, 224) input tensor.
fn preprocess(image_bytes: &[u8], device: &Device) -> Result<Tensor, EmbeddingError> {
    if image_bytes.is_empty() {
        return Err(EmbeddingError::InvalidInput(
            "empty image data".to_string(),
        ));
    }

    let img = image::load_from_memory(image_bytes)?
        .resize_exact(INPUT_SIZE as u32, INPUT_SIZE as u32, FilterType::Triangle)
        .to_rgb8();
    let data = img.into_raw();

    // HWC u8 -> CHW f32 in [0, 1], then ImageNet normalization
    let tensor = Tensor::from_vec(data, (INPUT_SIZE, INPUT_SIZE, 3), device)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(1.0 / 255.0, 0.0)?;

    let mean = Tensor::new(&IMAGENET_MEAN, device)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGENET_STD, device)?.reshape((3, 1, 1))?;

    Ok(tensor.broadcast_sub(&mean)?.broadcast_div(&std)?)
}

impl FeatureExtractor for ResnetExtractor {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn extract(&self, image: &[u8]) -> Result<Embedding, EmbeddingError> {
        let input = preprocess(image, &self.device)?.unsqueeze(0)?;
        let features = self.model.forward(&input)?;
        let row: Vec<f32> = features.squeeze(0)?.to_vec1()?;
        self.features_to_embedding(row)
    }

    fn extract_batch(&self, images: &[Vec<u8>]) -> Result<Vec<Embedding>, EmbeddingError> {
        if images.is_empty() {
            return Ok(vec![]);
        }

        debug!(count = images.len(), "Extracting feature batch");

        let inputs = images
            .iter()
            .map(|bytes| preprocess(bytes, &self.device))
            .collect::<Result<Vec<_>, _>>()?;
        let batch = Tensor::stack(&inputs, 0)?;

        let features = self.model.forward(&batch)?;
        let rows: Vec<Vec<f32>> = features.to_vec2()?;

        debug!(count = rows.len(), dim = RESNET50_DIM, "Batch complete");

        rows.into_iter()
            .map(|row| self.features_to_embedding(row))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_test_image(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([120, 40, 200]),
        ));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        bytes
    }

    #[test]
    fn test_preprocess_shape() {
        let bytes = encoded_test_image(50, 80);
        let tensor = preprocess(&bytes, &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[3, INPUT_SIZE, INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let bytes = encoded_test_image(64, 64);
        let a = preprocess(&bytes, &Device::Cpu)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        let b = preprocess(&bytes, &Device::Cpu)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_preprocess_rejects_empty_bytes() {
        let err = preprocess(&[], &Device::Cpu).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidInput(_)));
    }

    #[test]
    fn test_preprocess_rejects_garbage() {
        let err = preprocess(b"definitely not an image", &Device::Cpu).unwrap_err();
        assert!(matches!(err, EmbeddingError::Decode(_)));
    }

    // Integration tests require the weights download, run with:
    // cargo test -p lookalike-embeddings -- --ignored

    #[test]
    #[ignore = "requires model download"]
    fn test_load_model() {
        let extractor = ResnetExtractor::load_default().unwrap();
        assert_eq!(extractor.info().dimension, RESNET50_DIM);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_extract_is_deterministic_and_normalized() {
        let extractor = ResnetExtractor::load_default().unwrap();
        let bytes = encoded_test_image(300, 300);

        let a = extractor.extract(&bytes).unwrap();
        let b = extractor.extract(&bytes).unwrap();

        assert_eq!(a.dimension(), RESNET50_DIM);
        assert_eq!(a.values, b.values);

        let norm: f32 = a.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_extract_batch_matches_single() {
        let extractor = ResnetExtractor::load_default().unwrap();
        let first = encoded_test_image(300, 300);
        let second = encoded_test_image(120, 90);

        let batch = extractor
            .extract_batch(&[first.clone(), second])
            .unwrap();
        let single = extractor.extract(&first).unwrap();

        assert_eq!(batch.len(), 2);
        assert!((batch[0].cosine_similarity(&single) - 1.0).abs() < 1e-4);
    }
}
