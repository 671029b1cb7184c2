use kleff_operator::crd::tenant::Tenant;
use kube::core::CustomResourceExt;

fn main() {
    let crd = Tenant::crd();
    let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
    println!("{}", yaml);
}
