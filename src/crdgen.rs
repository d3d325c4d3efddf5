use controller::api::v1alpha1::RanCentralUnit;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&RanCentralUnit::crd())?);
    Ok(())
}
