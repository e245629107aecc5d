use facepair_core::{
    load_subjects, BoundingBox, FaceDetector, FullFrameDetector, LabelTable, LargestFace,
    Network, NetworkSpec, Pipeline, PipelineError, Predictor, Subject, WeightStore,
};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use tempfile::tempdir;

struct FixedDetector(Vec<BoundingBox>);

impl FaceDetector for FixedDetector {
    fn detect(&mut self, _frame: &GrayImage) -> Vec<BoundingBox> {
        self.0.clone()
    }
}

fn labels() -> LabelTable {
    ["match", "no-match"].into_iter().collect()
}

fn write_subjects(dir: &Path) -> Vec<Subject> {
    GrayImage::from_pixel(50, 50, Luma([200])).save(dir.join("b.png")).unwrap();
    GrayImage::from_pixel(64, 64, Luma([20])).save(dir.join("a.png")).unwrap();
    GrayImage::from_pixel(50, 50, Luma([90])).save(dir.join("c.png")).unwrap();
    load_subjects(dir).unwrap()
}

#[test]
fn test_pipeline_predicts_one_row_per_subject_in_order() {
    let root = tempdir().unwrap();
    let subjects = write_subjects(root.path());

    let spec = NetworkSpec::new(vec![5000, 10, 5, 3, 2]);
    let network = Network::random(&spec, &mut StdRng::seed_from_u64(0)).unwrap();
    let mut pipeline = Pipeline::new(
        FixedDetector(vec![BoundingBox::new(50, 50, 100, 100)]),
        Predictor::new(network, labels()),
    );

    let probe = DynamicImage::ImageRgb8(RgbImage::new(200, 200));
    let output = pipeline.run(&probe, &subjects).unwrap();

    let names: Vec<&str> = output.predictions.iter().map(|p| p.subject.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(output.degraded);
    for p in &output.predictions {
        assert!(p.prediction.class_index < 2);
        assert_eq!(p.prediction.scores.len(), 2);
        assert!(p.prediction.label.is_some());
    }
}

#[test]
fn test_pipeline_no_face() {
    let spec = NetworkSpec::new(vec![5000, 4, 2]);
    let network = Network::random(&spec, &mut StdRng::seed_from_u64(0)).unwrap();
    let mut pipeline = Pipeline::new(FixedDetector(vec![]), Predictor::new(network, labels()));

    let subject = Subject::new("s", facepair_core::Patch::from_gray(&GrayImage::new(50, 50)));
    let probe = DynamicImage::ImageRgb8(RgbImage::new(200, 200));
    let result = pipeline.run(&probe, &[subject]);
    assert!(matches!(
        result,
        Err(PipelineError::Extract(facepair_core::ExtractError::NoFaceDetected))
    ));
}

#[test]
fn test_pipeline_rejects_empty_gallery_and_wrong_width() {
    let probe = DynamicImage::ImageLuma8(GrayImage::new(60, 60));

    let spec = NetworkSpec::new(vec![5000, 2]);
    let net = Network::random(&spec, &mut StdRng::seed_from_u64(0)).unwrap();
    let mut pipeline = Pipeline::new(FullFrameDetector, Predictor::new(net, labels()));
    assert!(matches!(pipeline.run(&probe, &[]), Err(PipelineError::NoSubjects)));

    let spec = NetworkSpec::new(vec![100, 2]);
    let narrow = Network::random(&spec, &mut StdRng::seed_from_u64(0)).unwrap();
    let mut pipeline = Pipeline::new(FullFrameDetector, Predictor::new(narrow, labels()));
    let subject = Subject::new("s", facepair_core::Patch::from_gray(&GrayImage::new(50, 50)));
    assert!(matches!(
        pipeline.run(&probe, &[subject]),
        Err(PipelineError::InputWidth {
            network: 100,
            features: 5000
        })
    ));
}

#[test]
fn test_pipeline_with_saved_model_is_not_degraded() {
    let root = tempdir().unwrap();
    let subjects_dir = root.path().join("subjects");
    std::fs::create_dir_all(&subjects_dir).unwrap();
    let subjects = write_subjects(&subjects_dir);

    let spec = NetworkSpec::new(vec![5000, 8, 2]);
    let store = WeightStore::new(root.path().join("model"), "it");
    Network::random(&spec, &mut StdRng::seed_from_u64(5))
        .unwrap()
        .save(&store)
        .unwrap();

    let network = Network::load_or_random(&spec, &store, &mut StdRng::seed_from_u64(6)).unwrap();
    network.require_pretrained().unwrap();

    let mut pipeline = Pipeline::new(
        FixedDetector(vec![BoundingBox::new(0, 0, 10, 10), BoundingBox::new(0, 0, 80, 80)]),
        Predictor::new(network, labels()),
    )
    .with_selector(LargestFace);

    let probe = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 100, Luma([128])));
    let first = pipeline.run(&probe, &subjects).unwrap();
    let second = pipeline.run(&probe, &subjects).unwrap();
    assert!(!first.degraded);
    assert_eq!(first.predictions.len(), 3);
    for (a, b) in first.predictions.iter().zip(&second.predictions) {
        assert_eq!(a.prediction, b.prediction);
    }
}
