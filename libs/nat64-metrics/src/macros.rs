/// A short-hand way to access one of the metrics in `nat64_metrics::metrics`
#[macro_export]
macro_rules! metric {
    // Accept a name and multiple labels
    ($metric_name: ident, $($label_name: ident),+) => {
        nat64_metrics::metrics::$metric_name.with_label_values(&[$(nat64_metrics::metrics::label_values::$label_name),+])
    };

}
