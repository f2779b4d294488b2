pub mod customization;
